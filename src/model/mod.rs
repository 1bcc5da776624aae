pub mod constants;
pub mod leaderboard;
pub mod score;
pub mod stats_writer;
pub mod structures;
pub mod window;

pub use leaderboard::{LeaderboardModel, RecomputeError};
pub use score::{aggregate, ScoreSnapshot};
pub use window::{fetch_window, ResultWindow};
