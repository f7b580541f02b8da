//! Login: exchanges credentials for a bearer token.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::CorrelationId;
use common::messages::ValidateCredentials;
use saga_store::SagaRepository;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub correlation_id: CorrelationId,
    pub token: String,
    pub token_type: &'static str,
}

/// POST /api/v1/auth/token
#[tracing::instrument(skip(state, req))]
pub async fn token<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let correlation_id = CorrelationId::new();
    let request = ValidateCredentials {
        correlation_id,
        username: req.username,
        password: req.password,
    };

    let validated = match state
        .auth
        .validate_credentials
        .request_within(request, state.request_timeout)
        .await
    {
        Ok(Ok(validated)) => validated,
        Ok(Err(rejected)) => return Err(ApiError::Rejected(rejected.reason)),
        Err(error) => return Err(ApiError::from_transport(correlation_id, error)),
    };

    if !validated.is_authenticated {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    Ok(Json(TokenResponse {
        correlation_id,
        token: validated.token,
        token_type: "Bearer",
    }))
}
