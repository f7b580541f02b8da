use std::time::Duration;

use thiserror::Error;

/// A request that produced no usable reply.
///
/// All variants are transient from the caller's point of view: the request
/// may or may not have been processed, and sending it again is safe because
/// handlers are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint is not accepting requests.
    #[error("Endpoint '{endpoint}' is not accepting requests")]
    Closed { endpoint: &'static str },

    /// The endpoint dropped the request without replying.
    #[error("Endpoint '{endpoint}' dropped the request without replying")]
    NoReply { endpoint: &'static str },

    /// No reply arrived within the caller's bound.
    #[error("Request to '{endpoint}' timed out after {after:?}")]
    TimedOut {
        endpoint: &'static str,
        after: Duration,
    },
}

/// Outcome of a handler that did not produce a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request is refused for good; the caller receives a rejection.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The request could not be processed now. No reply is sent, leaving the
    /// message to the sender's redelivery policy.
    #[error("Not processed: {0}")]
    Unprocessed(String),
}
