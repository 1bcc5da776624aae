use crate::database::db_structs::RecordTarget;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_repr::Serialize_repr;
use uuid::Uuid;

#[derive(Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobState {
    Reset = 0,
    Replay = 1,
    Finalize = 2,
    Completed = 3,
    Failed = 4,
    /// Nothing to do, e.g. the participant does not exist
    Skipped = 5
}

/// A race whose scoring pipeline failed during replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRace {
    pub race_id: i32,
    pub participant_id: Option<i32>,
    pub error: String
}

/// Audit record of one recompute run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeJob {
    pub id: Uuid,
    pub scope: RecordTarget,
    pub season: u32,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows_reset: u64,
    pub races_replayed: u64,
    pub skipped: Vec<SkippedRace>,
    /// Set when the job ends in `Failed`
    pub error: Option<String>
}

impl RecomputeJob {
    pub fn start(scope: RecordTarget, season: u32) -> RecomputeJob {
        RecomputeJob {
            id: Uuid::new_v4(),
            scope,
            season,
            state: JobState::Reset,
            started_at: Utc::now(),
            finished_at: None,
            rows_reset: 0,
            races_replayed: 0,
            skipped: Vec::new(),
            error: None
        }
    }

    pub fn advance(&mut self, state: JobState) {
        self.state = state;

        if matches!(state, JobState::Completed | JobState::Failed | JobState::Skipped) {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.error = Some(error.to_string());
        self.advance(JobState::Failed);
    }

    pub fn skip_race(&mut self, race_id: i32, participant_id: Option<i32>, error: impl ToString) {
        self.skipped.push(SkippedRace {
            race_id,
            participant_id,
            error: error.to_string()
        });
    }

    pub fn races_skipped(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
