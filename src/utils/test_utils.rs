use crate::{
    database::{
        db_structs::{LeaderboardRecord, RaceHistory, RaceParticipant, RaceResult, RatingRecord, RecordTarget},
        LeaderboardStore, StoreError
    },
    model::{
        structures::{
            race_format::RaceFormat,
            scoring_mode::{QualifyingSet, ScoringMode},
            season::Season
        },
        window::ResultWindow
    }
};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError}
};

/// A point inside the current season, `hours` after a fixed origin
pub fn season_time(hours: i64) -> DateTime<Utc> {
    Season::current().start + Duration::days(1) + Duration::hours(hours)
}

/// A finished, ranked, solo race with a single participant
pub fn generate_race(
    race_id: i32,
    participant_id: i32,
    place: i32,
    run_time: i64,
    finished_at: DateTime<Utc>
) -> RaceHistory {
    RaceHistory {
        race_id,
        format: RaceFormat::Unseeded,
        ranked: true,
        solo: true,
        finished: true,
        finished_at,
        participants: vec![RaceParticipant {
            participant_id,
            name: Some(format!("Racer{}", participant_id)),
            place,
            run_time
        }]
    }
}

/// A window with one result per run time, newest first. A run time of 0 is
/// a forfeit.
pub fn generate_window(participant_id: i32, run_times: &[i64]) -> ResultWindow {
    let n = run_times.len() as i64;
    let results = run_times
        .iter()
        .enumerate()
        .map(|(i, run_time)| RaceResult {
            participant_id,
            race_id: i as i32,
            place: if *run_time == 0 { 0 } else { 1 },
            run_time: *run_time,
            race_finished_at: season_time(n - i as i64)
        })
        .collect();

    ResultWindow::new(participant_id, results, run_times.len())
}

/// `n_races` races spread over `participant_ids`, one hour apart, ascending.
/// Roughly one race in five is forfeited.
pub fn generate_race_history(n_races: i32, participant_ids: &[i32], seed: u64) -> Vec<RaceHistory> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n_races)
        .map(|i| {
            let participant_id = participant_ids[rng.random_range(0..participant_ids.len())];
            let (place, run_time) = if rng.random_bool(0.2) {
                (0, 0)
            } else {
                (1, rng.random_range(300_000..2_400_000))
            };

            generate_race(i + 1, participant_id, place, run_time, season_time(i as i64))
        })
        .collect()
}

/// A random interleaving of `races` that keeps each participant's races in
/// their original relative order
pub fn shuffle_preserving_participant_order(races: &[RaceHistory], seed: u64) -> Vec<RaceHistory> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut queues: BTreeMap<Option<i32>, VecDeque<RaceHistory>> = BTreeMap::new();

    for race in races {
        let key = race.solo_participant().map(|p| p.participant_id);
        queues.entry(key).or_default().push_back(race.clone());
    }

    let mut shuffled = Vec::with_capacity(races.len());
    while !queues.is_empty() {
        let keys = queues.keys().copied().collect_vec();
        let key = keys[rng.random_range(0..keys.len())];

        if let Some(queue) = queues.get_mut(&key) {
            if let Some(race) = queue.pop_front() {
                shuffled.push(race);
            }
            if queue.is_empty() {
                queues.remove(&key);
            }
        }
    }

    shuffled
}

#[derive(Default)]
struct MemoryState {
    participants: BTreeSet<i32>,
    races: Vec<RaceHistory>,
    leaderboard: BTreeMap<i32, LeaderboardRecord>,
    ratings: HashMap<(i32, ScoringMode), RatingRecord>,
    failing_reads: HashSet<i32>,
    failing_writes: HashSet<i32>,
    failing_leaderboard_resets: bool,
    failing_rating_resets: bool,
    failing_last_race: bool
}

/// In-memory [`LeaderboardStore`] with failure injection. Every operation
/// checks its failures before touching state, so a failed call changes
/// nothing.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>
}

impl MemoryStore {
    pub fn new(participant_ids: &[i32]) -> MemoryStore {
        let store = MemoryStore::default();
        store.state().participants.extend(participant_ids);

        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the race's participants as well
    pub fn insert_race(&self, race: RaceHistory) {
        let mut state = self.state();
        state
            .participants
            .extend(race.participants.iter().map(|p| p.participant_id));
        state.races.push(race);
    }

    pub fn insert_races(&self, races: &[RaceHistory]) {
        for race in races {
            self.insert_race(race.clone());
        }
    }

    /// Result window reads for the participant fail with `Unavailable`
    pub fn fail_reads_for(&self, participant_id: i32) {
        self.state().failing_reads.insert(participant_id);
    }

    /// Leaderboard writes for the participant fail with `ConstraintViolation`
    pub fn fail_writes_for(&self, participant_id: i32) {
        self.state().failing_writes.insert(participant_id);
    }

    /// Both leaderboard and rating resets fail
    pub fn fail_resets(&self) {
        let mut state = self.state();
        state.failing_leaderboard_resets = true;
        state.failing_rating_resets = true;
    }

    /// Only the rating part of a reset fails
    pub fn fail_rating_resets(&self) {
        self.state().failing_rating_resets = true;
    }

    /// Deriving `last_race` fails, both inside record writes and in the bulk
    /// recompute
    pub fn fail_last_race_updates(&self) {
        self.state().failing_last_race = true;
    }

    pub fn leaderboard_records(&self) -> BTreeMap<i32, LeaderboardRecord> {
        self.state().leaderboard.clone()
    }

    fn qualifying_races(state: &MemoryState, set: &QualifyingSet) -> Vec<RaceHistory> {
        state
            .races
            .iter()
            .filter(|r| set.contains(r))
            .sorted_by_key(|r| r.finished_at)
            .cloned()
            .collect()
    }

    fn last_race(
        state: &MemoryState,
        participant_id: i32,
        set: &QualifyingSet,
        as_of: Option<DateTime<Utc>>
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        if state.failing_last_race {
            return Err(StoreError::Unavailable("statement timeout".to_string()));
        }

        Ok(Self::qualifying_races(state, set)
            .iter()
            .filter(|r| as_of.map_or(true, |as_of| r.finished_at <= as_of))
            .filter(|r| r.participants.iter().any(|p| p.participant_id == participant_id))
            .map(|r| r.finished_at)
            .max())
    }

    fn targets(state: &MemoryState, target: RecordTarget) -> Result<Vec<i32>, StoreError> {
        match target {
            RecordTarget::All => Ok(state.participants.iter().copied().collect()),
            RecordTarget::Participant(id) if state.participants.contains(&id) => Ok(vec![id]),
            RecordTarget::Participant(id) => Err(StoreError::NotFound(id))
        }
    }
}

fn races_with(races: Vec<RaceHistory>, participant_id: i32) -> Vec<RaceHistory> {
    races
        .into_iter()
        .filter(|r| r.participants.iter().any(|p| p.participant_id == participant_id))
        .collect()
}

impl LeaderboardStore for MemoryStore {
    async fn participant_exists(&self, participant_id: i32) -> Result<bool, StoreError> {
        Ok(self.state().participants.contains(&participant_id))
    }

    async fn get_qualifying_result_window(
        &self,
        participant_id: i32,
        limit: usize,
        set: &QualifyingSet
    ) -> Result<Vec<RaceResult>, StoreError> {
        let state = self.state();
        if state.failing_reads.contains(&participant_id) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        Ok(Self::qualifying_races(&state, set)
            .iter()
            .flat_map(|r| r.results())
            .filter(|r| r.participant_id == participant_id)
            .sorted_by_key(|r| Reverse(r.race_finished_at))
            .take(limit)
            .collect())
    }

    async fn get_all_qualifying_races(&self, set: &QualifyingSet) -> Result<Vec<RaceHistory>, StoreError> {
        Ok(Self::qualifying_races(&self.state(), set))
    }

    async fn get_qualifying_races_for_participant(
        &self,
        participant_id: i32,
        set: &QualifyingSet
    ) -> Result<Vec<RaceHistory>, StoreError> {
        Ok(races_with(Self::qualifying_races(&self.state(), set), participant_id))
    }

    async fn reset_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        if state.failing_leaderboard_resets || state.failing_rating_resets {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let ids = Self::targets(&state, target)?;
        for id in &ids {
            state.leaderboard.insert(*id, LeaderboardRecord::reset(*id));
            state.ratings.insert((*id, mode), prior.clone());
        }

        Ok(ids.len() as u64)
    }

    async fn write_leaderboard_record(
        &self,
        record: &LeaderboardRecord,
        set: &QualifyingSet,
        as_of: DateTime<Utc>
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing_writes.contains(&record.participant_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "rejected write for {}",
                record.participant_id
            )));
        }
        if !state.participants.contains(&record.participant_id) {
            return Err(StoreError::NotFound(record.participant_id));
        }

        let last_race = Self::last_race(&state, record.participant_id, set, Some(as_of))?;
        state.leaderboard.insert(
            record.participant_id,
            LeaderboardRecord {
                last_race,
                ..record.clone()
            }
        );

        Ok(())
    }

    async fn get_leaderboard_record(&self, participant_id: i32) -> Result<Option<LeaderboardRecord>, StoreError> {
        Ok(self.state().leaderboard.get(&participant_id).cloned())
    }

    async fn recompute_last_race_timestamp(&self, target: RecordTarget, set: &QualifyingSet) -> Result<u64, StoreError> {
        let mut state = self.state();
        let ids = state
            .leaderboard
            .keys()
            .copied()
            .filter(|id| target.includes(*id))
            .collect_vec();

        let mut updates = Vec::with_capacity(ids.len());
        for id in ids {
            updates.push((id, Self::last_race(&state, id, set, None)?));
        }

        for (id, last_race) in &updates {
            if let Some(record) = state.leaderboard.get_mut(id) {
                record.last_race = *last_race;
            }
        }

        Ok(updates.len() as u64)
    }

    async fn reset_rating_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        if state.failing_rating_resets {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let ids = Self::targets(&state, target)?;
        for id in &ids {
            state.ratings.insert((*id, mode), prior.clone());
        }

        Ok(ids.len() as u64)
    }

    async fn write_rating_record(
        &self,
        participant_id: i32,
        mode: ScoringMode,
        record: &RatingRecord
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if !state.participants.contains(&participant_id) {
            return Err(StoreError::NotFound(participant_id));
        }

        state.ratings.insert((participant_id, mode), record.clone());
        Ok(())
    }

    async fn get_rating_record(&self, participant_id: i32, mode: ScoringMode) -> Result<Option<RatingRecord>, StoreError> {
        Ok(self.state().ratings.get(&(participant_id, mode)).cloned())
    }
}
