// Ranked solo leaderboard
pub const RESULT_WINDOW_SIZE: usize = 100;
/// Average, penalty and lowest time of a participant with no finished race
pub const THIRTY_MINUTES_MS: i64 = 30 * 60 * 1000;
// Season starting prior of the rating subsystem
pub const PRIOR_MU: f64 = 25.0;
pub const PRIOR_SIGMA: f64 = 8.333;
