use crate::{
    database::{
        db_structs::LeaderboardRecord,
        LeaderboardStore, StoreError
    },
    model::{score::ScoreSnapshot, structures::scoring_mode::QualifyingSet}
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// The scoring event a snapshot is written for
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub set: QualifyingSet,
    /// Finish time of the race that triggered scoring. The participant's last
    /// race is derived from races finished up to this instant.
    pub as_of: DateTime<Utc>
}

/// Millisecond columns are truncated toward zero. The adjusted average is the
/// sum of the truncated parts so the stored row stays self-consistent.
pub fn to_record(participant_id: i32, snapshot: &ScoreSnapshot) -> LeaderboardRecord {
    let real_average = snapshot.real_average as i64;
    let forfeit_penalty = snapshot.forfeit_penalty as i64;

    LeaderboardRecord {
        participant_id,
        adjusted_average: real_average + forfeit_penalty,
        real_average,
        num_races: snapshot.num_races as i32,
        num_forfeits: snapshot.num_forfeits as i32,
        forfeit_penalty,
        lowest_time: snapshot.lowest_time,
        last_race: None
    }
}

/// Persists the snapshot and the last race timestamp as of the scoring event
/// in one update.
pub async fn write_snapshot<S: LeaderboardStore>(
    store: &S,
    participant_id: i32,
    snapshot: &ScoreSnapshot,
    context: &ScoringContext
) -> Result<(), StoreError> {
    let record = to_record(participant_id, snapshot);
    store
        .write_leaderboard_record(&record, &context.set, context.as_of)
        .await?;

    debug!(
        participant_id,
        adjusted_average = record.adjusted_average,
        num_races = record.num_races,
        "Wrote leaderboard record"
    );

    Ok(())
}
