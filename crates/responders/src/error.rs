//! Responder error types.

use thiserror::Error;
use transport::HandlerError;

/// Errors that can occur while handling a child command.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// The command is invalid for this service. Final.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The write collides with a different entity on a unique field. Final.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The local store cannot be used right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for responder operations.
pub type Result<T> = std::result::Result<T, ResponderError>;

impl From<ResponderError> for HandlerError {
    fn from(e: ResponderError) -> Self {
        match e {
            ResponderError::Rejected(reason) | ResponderError::Conflict(reason) => {
                HandlerError::Rejected(reason)
            }
            other => HandlerError::Unprocessed(other.to_string()),
        }
    }
}
