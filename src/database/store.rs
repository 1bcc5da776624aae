use super::{
    db_structs::{LeaderboardRecord, RaceHistory, RaceResult, RatingRecord, RecordTarget},
    error::StoreError
};
use crate::model::structures::scoring_mode::{QualifyingSet, ScoringMode};
use chrono::{DateTime, Utc};

/// Every read and write the scoring engine needs from persistence.
///
/// Implemented by [`super::db::DbClient`] for PostgreSQL and by
/// `MemoryStore` in the test utilities.
#[allow(async_fn_in_trait)]
pub trait LeaderboardStore {
    async fn participant_exists(&self, participant_id: i32) -> Result<bool, StoreError>;

    /// Up to `limit` qualifying results for the participant, most recent first
    async fn get_qualifying_result_window(
        &self,
        participant_id: i32,
        limit: usize,
        set: &QualifyingSet
    ) -> Result<Vec<RaceResult>, StoreError>;

    /// Every qualifying race, ascending by finish time
    async fn get_all_qualifying_races(&self, set: &QualifyingSet) -> Result<Vec<RaceHistory>, StoreError>;

    /// Every qualifying race the participant took part in, ascending by finish time
    async fn get_qualifying_races_for_participant(
        &self,
        participant_id: i32,
        set: &QualifyingSet
    ) -> Result<Vec<RaceHistory>, StoreError>;

    /// Resets the leaderboard records and the `mode` rating records of the
    /// target in one atomic operation. Either both are reset or neither is.
    /// Returns the number of leaderboard rows reset.
    async fn reset_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError>;

    /// Overwrites one record in a single update. `last_race` is derived in the
    /// same update from the qualifying races finished at or before `as_of`.
    async fn write_leaderboard_record(
        &self,
        record: &LeaderboardRecord,
        set: &QualifyingSet,
        as_of: DateTime<Utc>
    ) -> Result<(), StoreError>;

    async fn get_leaderboard_record(&self, participant_id: i32) -> Result<Option<LeaderboardRecord>, StoreError>;

    /// Sets `last_race` to the latest qualifying finish time. Returns the
    /// number of rows updated.
    async fn recompute_last_race_timestamp(&self, target: RecordTarget, set: &QualifyingSet) -> Result<u64, StoreError>;

    async fn reset_rating_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError>;

    async fn write_rating_record(
        &self,
        participant_id: i32,
        mode: ScoringMode,
        record: &RatingRecord
    ) -> Result<(), StoreError>;

    async fn get_rating_record(&self, participant_id: i32, mode: ScoringMode) -> Result<Option<RatingRecord>, StoreError>;
}
