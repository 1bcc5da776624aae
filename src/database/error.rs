use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected the write: {0}")]
    ConstraintViolation(String),

    #[error("Participant {0} not found")]
    NotFound(i32)
}

impl StoreError {
    /// Class 23 covers every integrity constraint violation
    fn is_integrity_violation(state: &SqlState) -> bool {
        state.code().starts_with("23")
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.code() {
            Some(state) if StoreError::is_integrity_violation(state) => StoreError::ConstraintViolation(e.to_string()),
            _ => StoreError::Unavailable(e.to_string())
        }
    }
}
