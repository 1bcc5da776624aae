use crate::model::{constants::THIRTY_MINUTES_MS, window::ResultWindow};
use serde::Serialize;

/// Ranked solo statistics derived from one result window. Times are
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub real_average: f64,
    pub num_forfeits: u32,
    pub forfeit_penalty: f64,
    pub adjusted_average: f64,
    pub lowest_time: i64,
    pub num_races: u32
}

/// # Score aggregation
///
/// The average finish time is penalized by the fraction of races forfeited:
///
/// `forfeit_penalty = real_average * num_forfeits / num_races`
///
/// so a participant quitting half their races scores 1.5x their average.
///
/// When nothing was finished (every entry forfeited, or the window is empty)
/// there is no average to scale, and the average, penalty and lowest time all
/// take the 30 minute sentinel: the worst score possible.
pub fn aggregate(window: &ResultWindow) -> ScoreSnapshot {
    let (finishes, forfeits): (Vec<_>, Vec<_>) = window.results().iter().partition(|r| !r.is_forfeit());

    let num_races = window.len() as u32;
    let num_forfeits = forfeits.len() as u32;

    let (real_average, forfeit_penalty) = if finishes.is_empty() {
        (THIRTY_MINUTES_MS as f64, THIRTY_MINUTES_MS as f64)
    } else {
        let sum_times: i64 = finishes.iter().map(|r| r.run_time).sum();
        let real_average = sum_times as f64 / finishes.len() as f64;

        (real_average, real_average * num_forfeits as f64 / num_races as f64)
    };

    let lowest_time = finishes
        .iter()
        .map(|r| r.run_time)
        .min()
        .unwrap_or(THIRTY_MINUTES_MS);

    ScoreSnapshot {
        real_average,
        num_forfeits,
        forfeit_penalty,
        adjusted_average: real_average + forfeit_penalty,
        lowest_time,
        num_races
    }
}
