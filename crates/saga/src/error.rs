//! Saga error types.

use std::time::Duration;

use common::CorrelationId;
use saga_store::{InstanceError, StoreError};
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The top-level request failed validation. Nothing was persisted.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No saga with this correlation id.
    #[error("Saga not found: {0}")]
    NotFound(CorrelationId),

    /// Repository error.
    #[error("Saga store error: {0}")]
    Store(#[from] StoreError),

    /// The requested transition is not allowed from the saga's state.
    #[error("Saga transition error: {0}")]
    Instance(#[from] InstanceError),

    /// Every re-read after a version conflict lost the race again.
    #[error("Saga {correlation_id} still contended after {attempts} attempts")]
    ContentionExhausted {
        correlation_id: CorrelationId,
        attempts: u32,
    },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Outcome of a single child call that did not confirm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChildCallError {
    /// The service refused the command. Final, never retried.
    #[error("rejected: {0}")]
    Rejected(String),

    /// No reply within the call timeout. The child stays pending.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Delivery failed or the reply did not match the saga. The child stays pending.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChildCallError {
    /// Whether the reconciler may retry the child.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

impl From<transport::TransportError> for ChildCallError {
    fn from(error: transport::TransportError) -> Self {
        match error {
            transport::TransportError::TimedOut { after, .. } => Self::TimedOut(after),
            other => Self::Transport(other.to_string()),
        }
    }
}
