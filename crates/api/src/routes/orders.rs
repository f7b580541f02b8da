//! Order placement, answered by the Order service.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use common::messages::{CreateOrder, OrderProcessed};
use common::{AggregateId, CorrelationId};
use saga_store::SagaRepository;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/v1/orders`. The token may come from the body or from
/// an `Authorization: Bearer` header.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_id: Option<AggregateId>,
    #[serde(default)]
    pub jwt_token: Option<String>,
    pub course_ids: Vec<AggregateId>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// POST /api/v1/orders
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderProcessed>), ApiError> {
    let jwt_token = req
        .jwt_token
        .filter(|token| !token.is_empty())
        .or_else(|| bearer(&headers))
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;

    let correlation_id = CorrelationId::new();
    let command = CreateOrder {
        correlation_id,
        aggregate_id: req.order_id.unwrap_or_default(),
        jwt_token,
        course_ids: req.course_ids,
    };

    match state
        .order
        .create_order
        .request_within(command, state.request_timeout)
        .await
    {
        Ok(Ok(processed)) => Ok((StatusCode::CREATED, Json(processed))),
        Ok(Err(rejected)) => Err(ApiError::Rejected(rejected.reason)),
        Err(error) => Err(ApiError::from_transport(correlation_id, error)),
    }
}
