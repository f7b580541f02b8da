use common::CorrelationId;
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the saga repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update lost: the row moved past the version it was read at.
    #[error(
        "Concurrency conflict for saga {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        correlation_id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// The saga was not found.
    #[error("Saga not found: {0}")]
    NotFound(CorrelationId),

    /// A unique key (correlation, request or aggregate id) is already taken.
    #[error("Duplicate saga key: {0}")]
    Duplicate(String),

    /// The repository cannot serve requests right now.
    #[error("Saga repository unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be read back into a saga.
    #[error("Corrupt saga row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for saga repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
