//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{CorrelationId, ServiceStatus};
use saga::SagaError;
use transport::TransportError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Credentials did not check out.
    Unauthorized(String),
    /// A service refused the request.
    Rejected(String),
    /// No usable reply within the request bound. The request may still be
    /// processed, so this is not a server error.
    TimedOut(CorrelationId),
    /// Saga coordinator error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    /// Maps a failed request/response exchange.
    pub fn from_transport(correlation_id: CorrelationId, error: TransportError) -> Self {
        tracing::warn!(%correlation_id, %error, "no usable reply");
        ApiError::TimedOut(correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Rejected(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::TimedOut(correlation_id) => {
                let body = serde_json::json!({
                    "correlationId": correlation_id,
                    "status": ServiceStatus::TimedOut,
                });
                return (StatusCode::ACCEPTED, axum::Json(body)).into_response();
            }
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!(error = %err, "saga coordinator error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
