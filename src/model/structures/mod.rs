pub mod race_format;
pub mod recompute_job;
pub mod scoring_mode;
pub mod season;
