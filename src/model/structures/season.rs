use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use serde::Serialize;

pub const CURRENT_SEASON: u32 = 3;

/// A ranked solo season. Races count toward it when they finish strictly
/// between `start` and `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Season {
    pub number: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>
}

fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

lazy_static! {
    static ref SEASONS: Vec<Season> = vec![
        Season {
            number: 1,
            start: utc(2017, 10, 17, 23),
            end: utc(2018, 3, 17, 0)
        },
        Season {
            number: 2,
            start: utc(2018, 3, 18, 23),
            end: utc(2018, 10, 26, 0)
        },
        // Open ended
        Season {
            number: 3,
            start: utc(2021, 12, 1, 0),
            end: utc(2030, 1, 1, 0)
        },
    ];
}

impl Season {
    pub fn by_number(number: u32) -> Option<Season> {
        SEASONS.iter().find(|s| s.number == number).copied()
    }

    pub fn current() -> Season {
        SEASONS[SEASONS.len() - 1]
    }

    pub fn all() -> &'static [Season] {
        SEASONS.as_slice()
    }
}
