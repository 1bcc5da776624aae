use chrono::Duration;
use leaderboard_processor::{
    database::{
        db_structs::{LeaderboardRecord, RaceHistory, RatingRecord, RecordTarget},
        LeaderboardStore
    },
    model::{
        aggregate, fetch_window,
        constants::RESULT_WINDOW_SIZE,
        structures::{
            race_format::RaceFormat,
            recompute_job::{JobState, RecomputeJob},
            scoring_mode::ScoringMode,
            season::Season
        },
        LeaderboardModel
    },
    utils::test_utils::{generate_race, generate_race_history, season_time, shuffle_preserving_participant_order, MemoryStore}
};
use std::collections::BTreeMap;

use crate::common::init_test_env;

const PARTICIPANTS: [i32; 5] = [1, 2, 3, 4, 5];

fn without_last_race(records: BTreeMap<i32, LeaderboardRecord>) -> BTreeMap<i32, LeaderboardRecord> {
    records
        .into_iter()
        .map(|(id, record)| (id, LeaderboardRecord { last_race: None, ..record }))
        .collect()
}

async fn recomputed(races: &[RaceHistory]) -> BTreeMap<i32, LeaderboardRecord> {
    let store = MemoryStore::new(&PARTICIPANTS);
    store.insert_races(races);

    let model = LeaderboardModel::new(store);
    let job = model.recompute_leaderboard(&Season::current()).await.unwrap();
    assert_eq!(job.state, JobState::Completed);

    model.store().leaderboard_records()
}

#[tokio::test]
async fn test_full_recompute_is_idempotent() {
    init_test_env();
    let season = Season::current();
    let store = MemoryStore::new(&PARTICIPANTS);
    store.insert_races(&generate_race_history(300, &PARTICIPANTS, 1));

    let model = LeaderboardModel::new(store);

    let first_job = model.recompute_leaderboard(&season).await.unwrap();
    let first = model.store().leaderboard_records();

    let second_job = model.recompute_leaderboard(&season).await.unwrap();
    let second = model.store().leaderboard_records();

    assert_eq!(first, second);
    assert_eq!(first_job.races_replayed, 300);
    assert_eq!(second_job.races_replayed, 300);
    assert_ne!(first_job.id, second_job.id);
}

#[tokio::test]
async fn test_replay_matches_incremental_updates() {
    init_test_env();
    let season = Season::current();
    let races = generate_race_history(150, &PARTICIPANTS, 2);

    // Live: each race is persisted and then scored as it finishes
    let live = LeaderboardModel::new(MemoryStore::new(&PARTICIPANTS));
    for race in &races {
        live.store().insert_race(race.clone());
        live.on_race_finished(race, &season).await.unwrap();
    }

    let live_records = live.store().leaderboard_records();
    let replayed_records = recomputed(&races).await;

    // Participants without races only exist after a reset
    let replayed_with_races = replayed_records
        .into_iter()
        .filter(|(id, _)| live_records.contains_key(id))
        .collect::<BTreeMap<_, _>>();

    assert_eq!(live_records, replayed_with_races);
}

#[tokio::test]
async fn test_snapshot_independent_of_replay_order() {
    init_test_env();
    let season = Season::current();
    let set = ScoringMode::RankedSolo.qualifying_set(&season);
    let races = generate_race_history(200, &PARTICIPANTS, 3);
    let expected = recomputed(&races).await;

    for seed in [11, 12, 13] {
        let store = MemoryStore::new(&PARTICIPANTS);
        store.insert_races(&races);
        store
            .reset_records(RecordTarget::All, ScoringMode::RankedSolo, &RatingRecord::season_prior())
            .await
            .unwrap();

        let model = LeaderboardModel::new(store);
        let mut job = RecomputeJob::start(RecordTarget::All, season.number);
        let shuffled = shuffle_preserving_participant_order(&races, seed);

        model.replay_races(&mut job, &shuffled, &set).await;

        // Each participant's own races stayed in order, so even the last race
        // timestamps agree without a finalize pass
        assert_eq!(model.store().leaderboard_records(), expected);
    }
}

#[tokio::test]
async fn test_last_race_requires_chronological_replay() {
    init_test_env();
    let season = Season::current();
    let set = ScoringMode::RankedSolo.qualifying_set(&season);
    let races = generate_race_history(100, &PARTICIPANTS, 4);
    let expected = recomputed(&races).await;

    let store = MemoryStore::new(&PARTICIPANTS);
    store.insert_races(&races);
    store
        .reset_records(RecordTarget::All, ScoringMode::RankedSolo, &RatingRecord::season_prior())
        .await
        .unwrap();

    let model = LeaderboardModel::new(store);
    let mut job = RecomputeJob::start(RecordTarget::All, season.number);
    let reversed = races.iter().rev().cloned().collect::<Vec<_>>();

    model.replay_races(&mut job, &reversed, &set).await;
    let replayed = model.store().leaderboard_records();

    // Snapshots converge regardless of order
    assert_eq!(without_last_race(replayed.clone()), without_last_race(expected.clone()));

    // Timestamps track the last race replayed, which is each participant's
    // earliest race in reverse order
    for (id, record) in &replayed {
        let own_races = races
            .iter()
            .filter(|r| r.solo_participant().map(|p| p.participant_id) == Some(*id))
            .collect::<Vec<_>>();

        assert_eq!(record.last_race, own_races.first().map(|r| r.finished_at));
        if own_races.len() > 1 {
            assert_ne!(record.last_race, expected[id].last_race);
        }
    }

    // The finalize pass restores them
    model
        .store()
        .recompute_last_race_timestamp(RecordTarget::All, &set)
        .await
        .unwrap();

    assert_eq!(model.store().leaderboard_records(), expected);
}

#[tokio::test]
async fn test_non_qualifying_races_are_ignored() {
    init_test_env();
    let season = Season::current();
    let races = generate_race_history(80, &PARTICIPANTS, 5);
    let expected = recomputed(&races).await;

    let mut noisy = races.clone();

    let mut unranked = generate_race(1001, 1, 1, 1_000, season_time(3));
    unranked.ranked = false;
    noisy.push(unranked);

    let mut multiplayer = generate_race(1002, 2, 1, 1_000, season_time(4));
    multiplayer.solo = false;
    multiplayer.format = RaceFormat::Seeded;
    noisy.push(multiplayer);

    let mut unfinished = generate_race(1003, 3, 1, 1_000, season_time(5));
    unfinished.finished = false;
    noisy.push(unfinished);

    noisy.push(generate_race(1004, 4, 1, 1_000, season.start - Duration::days(10)));
    noisy.push(generate_race(1005, 5, 1, 1_000, season.end + Duration::days(10)));

    assert_eq!(recomputed(&noisy).await, expected);
}

#[tokio::test]
async fn test_participant_without_qualifying_races_scores_sentinel() {
    init_test_env();
    let season = Season::current();
    let set = ScoringMode::RankedSolo.qualifying_set(&season);

    let store = MemoryStore::new(&[1]);
    store.insert_race(generate_race(1, 1, 1, 600_000, season.start - Duration::days(1)));

    let window = fetch_window(&store, 1, RESULT_WINDOW_SIZE, &set).await.unwrap();
    let snapshot = aggregate(&window);

    assert_eq!(snapshot.num_races, 0);
    assert_eq!(snapshot.num_forfeits, 0);
    assert_eq!(snapshot.real_average, 1_800_000.0);
    assert_eq!(snapshot.forfeit_penalty, 1_800_000.0);
    assert_eq!(snapshot.lowest_time, 1_800_000);
}

#[tokio::test]
async fn test_all_forfeit_participant() {
    init_test_env();
    let season = Season::current();
    let store = MemoryStore::new(&[1]);
    for i in 0..5 {
        store.insert_race(generate_race(i + 1, 1, 0, 0, season_time(i as i64)));
    }

    let model = LeaderboardModel::new(store);
    model.recompute_leaderboard(&season).await.unwrap();

    let record = model.leaderboard_record(1).await.unwrap().unwrap();
    assert_eq!(record.num_races, 5);
    assert_eq!(record.num_forfeits, 5);
    assert_eq!(record.real_average, 1_800_000);
    assert_eq!(record.forfeit_penalty, 1_800_000);
    assert_eq!(record.lowest_time, 1_800_000);
    assert_eq!(record.last_race, Some(season_time(4)));
}

#[tokio::test]
async fn test_partial_failure_then_rerun_converges() {
    init_test_env();
    let season = Season::current();
    let races = generate_race_history(120, &PARTICIPANTS, 6);
    let expected = recomputed(&races).await;

    let store = MemoryStore::new(&PARTICIPANTS);
    store.insert_races(&races);
    store.fail_reads_for(3);

    let model = LeaderboardModel::new(store);
    let job = model.recompute_leaderboard(&season).await.unwrap();

    let failed_races = races
        .iter()
        .filter(|r| r.solo_participant().map(|p| p.participant_id) == Some(3))
        .count();

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.races_skipped(), failed_races);
    assert_eq!(job.races_replayed as usize, races.len() - failed_races);

    let records = model.store().leaderboard_records();
    for id in [1, 2, 4, 5] {
        assert_eq!(records[&id], expected[&id]);
    }
    assert_eq!(records[&3].num_races, 0);

    // A clean rerun on a healthy store reaches the same state
    let healthy = LeaderboardModel::new(MemoryStore::new(&PARTICIPANTS));
    healthy.store().insert_races(&races);
    healthy.recompute_leaderboard(&season).await.unwrap();
    healthy.recompute_leaderboard(&season).await.unwrap();

    assert_eq!(healthy.store().leaderboard_records(), expected);
}
