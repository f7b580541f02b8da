//! Shared identifiers and message contracts.

pub mod messages;
pub mod status;
pub mod types;
pub mod validate;

pub use messages::Correlated;
pub use status::{ServiceName, ServiceStatus};
pub use types::{AggregateId, CorrelationId};
