//! Error types for the session/ban ledger.

use thiserror::Error;

use crate::error::ErrorClass;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error that is not a constraint violation.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// A write violated a schema invariant (duplicate key, second open session).
    #[error("data integrity violation: {0}")]
    Integrity(String),

    /// A stored row could not be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration { message: String },

    /// Could not create the database directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True for errors that only affect the offending write.
    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity(_) | StoreError::Corrupted(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Integrity(_) | StoreError::Corrupted(_) | StoreError::Migration { .. } => {
                ErrorClass::DataIntegrity
            }
            StoreError::Sqlite(_) | StoreError::Io(_) | StoreError::Poisoned => {
                ErrorClass::TransientIo
            }
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            return StoreError::Integrity(err.to_string());
        }
        if matches!(err, rusqlite::Error::FromSqlConversionFailure(..)) {
            return StoreError::Corrupted(err.to_string());
        }
        StoreError::Sqlite(err)
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
