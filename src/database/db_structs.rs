use crate::model::{
    constants::{PRIOR_MU, PRIOR_SIGMA},
    structures::race_format::RaceFormat
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One participant's result in a finished race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceResult {
    pub participant_id: i32,
    pub race_id: i32,
    /// 0 means the participant quit, otherwise the finishing position
    pub place: i32,
    /// Milliseconds
    pub run_time: i64,
    pub race_finished_at: DateTime<Utc>
}

impl RaceResult {
    pub fn is_forfeit(&self) -> bool {
        self.place == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceParticipant {
    pub participant_id: i32,
    pub name: Option<String>,
    pub place: i32,
    pub run_time: i64
}

/// A finished race with every participant attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceHistory {
    pub race_id: i32,
    pub format: RaceFormat,
    pub ranked: bool,
    pub solo: bool,
    pub finished: bool,
    pub finished_at: DateTime<Utc>,
    pub participants: Vec<RaceParticipant>
}

impl RaceHistory {
    pub fn results(&self) -> Vec<RaceResult> {
        self.participants
            .iter()
            .map(|p| RaceResult {
                participant_id: p.participant_id,
                race_id: self.race_id,
                place: p.place,
                run_time: p.run_time,
                race_finished_at: self.finished_at
            })
            .collect()
    }

    /// The only racer of a solo race. Returns `None` when the race does not
    /// have exactly one participant.
    pub fn solo_participant(&self) -> Option<&RaceParticipant> {
        match self.participants.as_slice() {
            [participant] => Some(participant),
            _ => None
        }
    }
}

/// Persisted ranked solo leaderboard row. All times are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub participant_id: i32,
    pub adjusted_average: i64,
    pub real_average: i64,
    pub num_races: i32,
    pub num_forfeits: i32,
    pub forfeit_penalty: i64,
    pub lowest_time: i64,
    pub last_race: Option<DateTime<Utc>>
}

impl LeaderboardRecord {
    /// The row every participant holds right after a reset
    pub fn reset(participant_id: i32) -> LeaderboardRecord {
        LeaderboardRecord {
            participant_id,
            adjusted_average: 0,
            real_average: 0,
            num_races: 0,
            num_forfeits: 0,
            forfeit_penalty: 0,
            lowest_time: 0,
            last_race: None
        }
    }
}

/// Skill rating values owned by the rating subsystem. This crate only stores
/// and resets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: f64,
    pub mu: f64,
    pub sigma: f64,
    pub change: f64,
    pub num_races: i32,
    pub last_race: Option<DateTime<Utc>>
}

impl RatingRecord {
    /// Values every participant starts a season with
    pub fn season_prior() -> RatingRecord {
        RatingRecord {
            rating: PRIOR_MU,
            mu: PRIOR_MU,
            sigma: PRIOR_SIGMA,
            change: 0.0,
            num_races: 0,
            last_race: None
        }
    }
}

/// Which rows a reset or timestamp fix-up applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordTarget {
    All,
    Participant(i32)
}

impl RecordTarget {
    pub fn includes(&self, participant_id: i32) -> bool {
        match self {
            RecordTarget::All => true,
            RecordTarget::Participant(id) => *id == participant_id
        }
    }

    pub fn participant_id(&self) -> Option<i32> {
        match self {
            RecordTarget::All => None,
            RecordTarget::Participant(id) => Some(*id)
        }
    }
}
