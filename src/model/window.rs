use crate::{
    database::{db_structs::RaceResult, LeaderboardStore, StoreError},
    model::structures::scoring_mode::QualifyingSet
};
use std::cmp::Reverse;
use tracing::debug;

/// The most recent qualifying results of one participant, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWindow {
    participant_id: i32,
    results: Vec<RaceResult>
}

impl ResultWindow {
    /// Orders `results` newest first and keeps at most `limit` of them
    pub fn new(participant_id: i32, mut results: Vec<RaceResult>, limit: usize) -> ResultWindow {
        results.sort_by_key(|r| Reverse(r.race_finished_at));
        results.truncate(limit);

        ResultWindow {
            participant_id,
            results
        }
    }

    pub fn participant_id(&self) -> i32 {
        self.participant_id
    }

    pub fn results(&self) -> &[RaceResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Fetches the participant's `limit` most recent qualifying results.
/// A participant without qualifying races gets an empty window.
pub async fn fetch_window<S: LeaderboardStore>(
    store: &S,
    participant_id: i32,
    limit: usize,
    set: &QualifyingSet
) -> Result<ResultWindow, StoreError> {
    let results = store
        .get_qualifying_result_window(participant_id, limit, set)
        .await?;

    debug!(participant_id, results = results.len(), "Fetched result window");

    Ok(ResultWindow::new(participant_id, results, limit))
}
