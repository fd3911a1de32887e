//! Database error types.

use mintyflow_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open local store at {path}: {source}")]
    StorageInit {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("local store is not initialized")]
    NotInitialized,

    #[error("sqlite error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl DbError {
    /// Constraint violations (foreign key, unique, check) reported by SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbError::Query(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
