pub mod db;
pub mod db_structs;
pub mod error;
pub mod store;

pub use db::DbClient;
pub use error::StoreError;
pub use store::LeaderboardStore;
