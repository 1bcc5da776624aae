use clap::Parser;
use leaderboard_processor::{
    args::Args,
    database::DbClient,
    model::{structures::{recompute_job::RecomputeJob, season::Season}, LeaderboardModel}
};
use std::process::exit;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let Some(season) = Season::by_number(args.season) else {
        error!("Unknown season {}", args.season);
        exit(1);
    };

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            exit(1);
        }
    };

    let model = LeaderboardModel::new(client);
    let result = match args.participant {
        Some(participant_id) => model.recompute_leaderboard_for_participant(participant_id, &season).await,
        None => model.recompute_leaderboard(&season).await
    };

    match result {
        Ok(job) => log_job(&job),
        Err(e) => {
            error!("{}", e);
            log_job(&e.job);
            exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

fn log_job(job: &RecomputeJob) {
    match serde_json::to_string(job) {
        Ok(json) => info!(job = %json, "Recompute job record"),
        Err(e) => warn!("Failed to serialize job record: {}", e)
    }
}
