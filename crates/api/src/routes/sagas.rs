//! Saga-opening endpoints and saga lookup for polling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::messages::{CreateCourse, CreateCourseSagaStarted, CreateUser, CreateUserSagaStarted};
use common::{AggregateId, CorrelationId};
use saga_store::{ChildKind, SagaInstance, SagaRepository};
use serde::{Deserialize, Serialize};

use super::parse_uuid;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// Body of `POST /api/v1/users`. Supplying `correlationId` makes the call
/// safe to retry: the same id always maps to the same saga.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub correlation_id: Option<CorrelationId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/v1/courses`. `requestId` plays the same role as
/// `correlationId` for users.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub request_id: Option<AggregateId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaResponse {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub saga_type: &'static str,
    pub state: &'static str,
    pub attempt_count: u32,
    pub expected_children: Vec<&'static str>,
    pub confirmed_children: Vec<&'static str>,
    pub pending_children: Vec<&'static str>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// Only meaningful while the saga is still awaiting children.
    pub next_attempt_at: DateTime<Utc>,
}

fn names<'a>(children: impl IntoIterator<Item = &'a ChildKind>) -> Vec<&'static str> {
    children.into_iter().map(|c| c.as_str()).collect()
}

impl From<&SagaInstance> for SagaResponse {
    fn from(saga: &SagaInstance) -> Self {
        Self {
            correlation_id: saga.correlation_id,
            aggregate_id: saga.aggregate_id,
            saga_type: saga.saga_type.as_str(),
            state: saga.state.as_str(),
            attempt_count: saga.attempt_count,
            expected_children: names(&saga.expected_children),
            confirmed_children: names(&saga.confirmed_children),
            pending_children: names(&saga.pending_children()),
            failure_reason: saga.failure_reason.clone(),
            created_at: saga.created_at,
            last_attempt_at: saga.last_attempt_at,
            next_attempt_at: saga.next_attempt_at,
        }
    }
}

// -- Handlers --

/// POST /api/v1/users: opens a CreateUser saga. Answers 202 before any
/// service has been called; poll `/api/v1/sagas/{correlationId}` for the outcome.
#[tracing::instrument(skip(state, req))]
pub async fn create_user<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserSagaStarted>), ApiError> {
    let request = CreateUser {
        correlation_id: req.correlation_id.unwrap_or_default(),
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        password: req.password,
    };
    let request_id = request.correlation_id;

    let started = tokio::time::timeout(
        state.request_timeout,
        state.coordinator.start_user_saga(request),
    )
    .await
    .map_err(|_| ApiError::TimedOut(request_id))??;

    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// POST /api/v1/courses: opens a CreateCourse saga.
#[tracing::instrument(skip(state, req))]
pub async fn create_course<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CreateCourseSagaStarted>), ApiError> {
    let request = CreateCourse {
        aggregate_id: req.request_id.unwrap_or_default(),
        title: req.title,
        description: req.description,
        price: req.price,
    };
    let request_id = CorrelationId::from_uuid(request.aggregate_id.as_uuid());

    let started = tokio::time::timeout(
        state.request_timeout,
        state.coordinator.start_course_saga(request),
    )
    .await
    .map_err(|_| ApiError::TimedOut(request_id))??;

    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// GET /api/v1/sagas/{id}: looks the saga up by correlation id, then by
/// aggregate id.
#[tracing::instrument(skip(state))]
pub async fn get<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let uuid = parse_uuid("saga id", &id)?;

    let saga = match state
        .coordinator
        .get_saga(CorrelationId::from_uuid(uuid))
        .await?
    {
        Some(saga) => saga,
        None => state
            .coordinator
            .get_saga_by_aggregate(AggregateId::from_uuid(uuid))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?,
    };

    Ok(Json(SagaResponse::from(&saga)))
}
