use core::result::Result as CoreResult;
use std::io::Error as IoError;

use rusqlite::Error as SqliteError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = CoreResult<T, StoreError>;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Sqlite(#[from] SqliteError),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// A stored value could not be converted back into a domain type.
    #[error("Core error: {0}")]
    Core(#[from] taskmaster_core::Error),

    /// A record violates a field constraint.
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// The write would break a uniqueness rule.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No record with the given identifier is visible to the caller.
    #[error("{0} not found")]
    NotFound(String),
}

impl StoreError {
    /// Maps unique-constraint failures to [`StoreError::Conflict`].
    pub(crate) fn from_write(error: SqliteError, context: &str) -> Self {
        match error {
            SqliteError::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(context.to_owned())
            }
            other => Self::Sqlite(other),
        }
    }
}
