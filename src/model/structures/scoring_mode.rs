use super::{race_format::RaceFormat, season::Season};
use crate::database::db_structs::RaceHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a leaderboard or rating board is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoringMode {
    RankedSolo,
    Multiplayer(RaceFormat)
}

impl ScoringMode {
    /// Key of this mode's rows in `rating_records.board`
    pub fn board(&self) -> &'static str {
        match self {
            ScoringMode::RankedSolo => "ranked_solo",
            ScoringMode::Multiplayer(RaceFormat::Unseeded) => "unseeded",
            ScoringMode::Multiplayer(RaceFormat::Seeded) => "seeded",
            ScoringMode::Multiplayer(RaceFormat::Diversity) => "diversity",
            ScoringMode::Multiplayer(RaceFormat::Custom) => "custom"
        }
    }

    /// Resolves which races count toward this mode during `season`
    pub fn qualifying_set(&self, season: &Season) -> QualifyingSet {
        match self {
            ScoringMode::RankedSolo => QualifyingSet {
                ranked: Some(true),
                solo: true,
                format: None,
                window: Some((season.start, season.end))
            },
            ScoringMode::Multiplayer(format) => QualifyingSet {
                ranked: None,
                solo: false,
                format: Some(*format),
                window: None
            }
        }
    }
}

/// Predicate over finished races. `None` fields do not filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualifyingSet {
    pub ranked: Option<bool>,
    pub solo: bool,
    pub format: Option<RaceFormat>,
    /// Exclusive bounds on the finish time
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>
}

impl QualifyingSet {
    pub fn contains(&self, race: &RaceHistory) -> bool {
        race.finished
            && race.solo == self.solo
            && self.ranked.map_or(true, |ranked| race.ranked == ranked)
            && self.format.map_or(true, |format| race.format == format)
            && self.contains_time(race.finished_at)
    }

    pub fn contains_time(&self, finished_at: DateTime<Utc>) -> bool {
        match self.window {
            Some((start, end)) => start < finished_at && finished_at < end,
            None => true
        }
    }
}
