//! HTTP handlers, one module per resource.

pub mod auth;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod sagas;
pub mod status;

use uuid::Uuid;

use crate::error::ApiError;

fn parse_uuid(what: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
