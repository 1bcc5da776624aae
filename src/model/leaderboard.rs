use crate::{
    database::{
        db_structs::{LeaderboardRecord, RaceHistory, RatingRecord, RecordTarget},
        LeaderboardStore, StoreError
    },
    model::{
        constants::RESULT_WINDOW_SIZE,
        score::{aggregate, ScoreSnapshot},
        stats_writer::{write_snapshot, ScoringContext},
        structures::{
            recompute_job::{JobState, RecomputeJob},
            scoring_mode::{QualifyingSet, ScoringMode},
            season::Season
        },
        window::fetch_window
    },
    utils::progress_utils::progress_bar
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A recompute aborted by a store failure outside of the per-race pipeline.
/// The job record is kept for auditing.
#[derive(Debug, Error)]
#[error("Recompute job {} failed during {stage:?}: {source}", .job.id)]
pub struct RecomputeError {
    pub stage: JobState,
    pub source: StoreError,
    pub job: Box<RecomputeJob>
}

/// Ranked solo leaderboard scoring.
///
/// Callers are expected to serialize scoring of a single participant; two
/// concurrent `on_race_finished` calls for the same participant race on
/// fetch-then-write order and the last write wins.
pub struct LeaderboardModel<S: LeaderboardStore> {
    store: S,
    mode: ScoringMode,
    window_size: usize
}

impl<S: LeaderboardStore> LeaderboardModel<S> {
    pub fn new(store: S) -> LeaderboardModel<S> {
        LeaderboardModel {
            store,
            mode: ScoringMode::RankedSolo,
            window_size: RESULT_WINDOW_SIZE
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> LeaderboardModel<S> {
        self.window_size = window_size;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    /// Scores the solo participant of a race that just finished.
    ///
    /// Races outside the qualifying set, without exactly one participant, or
    /// whose participant is unknown are ignored and `None` is returned. On error the participant's record
    /// is left as it was.
    pub async fn on_race_finished(
        &self,
        race: &RaceHistory,
        season: &Season
    ) -> Result<Option<ScoreSnapshot>, StoreError> {
        let set = self.mode.qualifying_set(season);

        if !set.contains(race) {
            debug!(race_id = race.race_id, "Race does not qualify, skipping");
            return Ok(None);
        }

        let Some(participant) = race.solo_participant() else {
            warn!(
                race_id = race.race_id,
                participants = race.participants.len(),
                "Solo race without exactly one participant, skipping"
            );
            return Ok(None);
        };

        match self
            .score_participant(participant.participant_id, race.finished_at, &set)
            .await
        {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::NotFound(participant_id)) => {
                warn!(
                    race_id = race.race_id,
                    participant_id,
                    "Participant not found, skipping"
                );
                Ok(None)
            }
            Err(e) => {
                error!(
                    race_id = race.race_id,
                    participant_id = participant.participant_id,
                    "Failed to update the ranked solo stats: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Resets every record, then replays every qualifying race of the season
    /// in chronological order.
    pub async fn recompute_leaderboard(&self, season: &Season) -> Result<RecomputeJob, RecomputeError> {
        let job = RecomputeJob::start(RecordTarget::All, season.number);
        info!(job_id = %job.id, season = season.number, "Recomputing the ranked solo leaderboard");

        self.run(job, season).await
    }

    /// Same as [`Self::recompute_leaderboard`] restricted to one participant.
    /// Other participants are untouched. An unknown participant is a no-op.
    pub async fn recompute_leaderboard_for_participant(
        &self,
        participant_id: i32,
        season: &Season
    ) -> Result<RecomputeJob, RecomputeError> {
        let mut job = RecomputeJob::start(RecordTarget::Participant(participant_id), season.number);
        info!(
            job_id = %job.id,
            participant_id,
            season = season.number,
            "Recomputing the ranked solo leaderboard for participant"
        );

        match self.store.participant_exists(participant_id).await {
            Ok(true) => self.run(job, season).await,
            Ok(false) => {
                warn!(participant_id, "Participant not found, nothing to recompute");
                job.advance(JobState::Skipped);
                Ok(job)
            }
            Err(e) => Err(Self::abort(job, JobState::Reset, e))
        }
    }

    /// Reset -> Replay -> Finalize
    async fn run(&self, mut job: RecomputeJob, season: &Season) -> Result<RecomputeJob, RecomputeError> {
        let set = self.mode.qualifying_set(season);
        let target = job.scope;

        match self.reset(target).await {
            Ok(rows) => job.rows_reset = rows,
            Err(StoreError::NotFound(participant_id)) => {
                warn!(participant_id, "Participant disappeared before reset, nothing to recompute");
                job.advance(JobState::Skipped);
                return Ok(job);
            }
            Err(e) => return Err(Self::abort(job, JobState::Reset, e))
        }

        job.advance(JobState::Replay);
        let races = match self.races_for(target, &set).await {
            Ok(races) => races,
            Err(e) => return Err(Self::abort(job, JobState::Replay, e))
        };

        // Last race timestamps are only correct once each participant's
        // chronologically last race has been replayed
        let races = races.into_iter().sorted_by_key(|r| r.finished_at).collect_vec();
        self.replay_races(&mut job, &races, &set).await;

        job.advance(JobState::Finalize);
        if let Err(e) = self.store.recompute_last_race_timestamp(target, &set).await {
            return Err(Self::abort(job, JobState::Finalize, e));
        }

        job.advance(JobState::Completed);
        info!(
            job_id = %job.id,
            rows_reset = job.rows_reset,
            races_replayed = job.races_replayed,
            races_skipped = job.races_skipped(),
            "Successfully recomputed the ranked solo leaderboard"
        );

        Ok(job)
    }

    async fn reset(&self, target: RecordTarget) -> Result<u64, StoreError> {
        let rows = self
            .store
            .reset_records(target, self.mode, &RatingRecord::season_prior())
            .await?;

        info!(rows, "Reset ranked solo stats");
        Ok(rows)
    }

    async fn races_for(&self, target: RecordTarget, set: &QualifyingSet) -> Result<Vec<RaceHistory>, StoreError> {
        match target {
            RecordTarget::All => self.store.get_all_qualifying_races(set).await,
            RecordTarget::Participant(id) => self.store.get_qualifying_races_for_participant(id, set).await
        }
    }

    /// Scores each race's solo participant as if the race had just finished,
    /// in the order given. A failing race is recorded on the job and skipped.
    pub async fn replay_races(&self, job: &mut RecomputeJob, races: &[RaceHistory], set: &QualifyingSet) {
        let bar = progress_bar(races.len() as u64, "Replaying ranked solo races".to_string());

        for race in races {
            if let Some(bar) = &bar {
                bar.inc(1);
            }

            if !set.contains(race) {
                debug!(race_id = race.race_id, "Race does not qualify, skipping");
                continue;
            }

            let Some(participant) = race.solo_participant() else {
                warn!(race_id = race.race_id, "Solo race without exactly one participant, skipping");
                job.skip_race(race.race_id, None, "race does not have exactly one participant");
                continue;
            };

            if !job.scope.includes(participant.participant_id) {
                continue;
            }

            match self
                .score_participant(participant.participant_id, race.finished_at, set)
                .await
            {
                Ok(_) => job.races_replayed += 1,
                Err(e) => {
                    warn!(
                        race_id = race.race_id,
                        participant_id = participant.participant_id,
                        "Failed to replay race: {}",
                        e
                    );
                    job.skip_race(race.race_id, Some(participant.participant_id), e);
                }
            }
        }

        if let Some(bar) = bar {
            bar.finish_with_message("Replay complete");
        }
    }

    /// Fetch -> aggregate -> write
    async fn score_participant(
        &self,
        participant_id: i32,
        as_of: DateTime<Utc>,
        set: &QualifyingSet
    ) -> Result<ScoreSnapshot, StoreError> {
        let window = fetch_window(&self.store, participant_id, self.window_size, set).await?;
        let snapshot = aggregate(&window);

        write_snapshot(&self.store, participant_id, &snapshot, &ScoringContext { set: *set, as_of }).await?;

        Ok(snapshot)
    }

    fn abort(mut job: RecomputeJob, stage: JobState, source: StoreError) -> RecomputeError {
        error!(job_id = %job.id, ?stage, "Recompute aborted: {}", source);
        job.fail(&source);

        RecomputeError {
            stage,
            source,
            job: Box::new(job)
        }
    }

    pub async fn leaderboard_record(&self, participant_id: i32) -> Result<Option<LeaderboardRecord>, StoreError> {
        self.store.get_leaderboard_record(participant_id).await
    }

    /// Stores rating values computed by the rating subsystem for any board
    pub async fn store_rating(
        &self,
        participant_id: i32,
        mode: ScoringMode,
        record: &RatingRecord
    ) -> Result<(), StoreError> {
        self.store.write_rating_record(participant_id, mode, record).await
    }

    pub async fn rating(&self, participant_id: i32, mode: ScoringMode) -> Result<Option<RatingRecord>, StoreError> {
        self.store.get_rating_record(participant_id, mode).await
    }

    /// Puts the `mode` ratings of the target back to the season prior. The
    /// ranked solo board is also reset by every leaderboard recompute.
    pub async fn reset_ratings(&self, mode: ScoringMode, target: RecordTarget) -> Result<u64, StoreError> {
        let rows = self
            .store
            .reset_rating_records(target, mode, &RatingRecord::season_prior())
            .await?;

        info!(board = mode.board(), rows, "Reset ratings");
        Ok(rows)
    }
}
