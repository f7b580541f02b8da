//! Liveness of the orchestrator and each dependent service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::messages::{AskForAuthServiceStatus, AskForLearnerServiceStatus, AskForOrderServiceStatus};
use common::{CorrelationId, ServiceName, ServiceStatus};
use saga_store::SagaRepository;
use serde::Serialize;
use transport::{Reply, TransportError};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusResponse {
    pub correlation_id: CorrelationId,
    pub service: ServiceName,
    pub status: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct OverallStatusResponse {
    /// RUNNING only when every service is.
    pub status: ServiceStatus,
    pub services: Vec<ServiceStatusResponse>,
}

fn settle<T>(
    result: Result<Reply<T>, TransportError>,
    status: impl FnOnce(T) -> ServiceStatus,
) -> ServiceStatus {
    match result {
        Ok(Ok(reply)) => status(reply),
        Ok(Err(rejected)) => {
            tracing::warn!(reason = %rejected.reason, "status request rejected");
            ServiceStatus::Degraded
        }
        Err(_) => ServiceStatus::TimedOut,
    }
}

async fn ask<R: SagaRepository + 'static>(
    state: &AppState<R>,
    service: ServiceName,
) -> ServiceStatusResponse {
    let correlation_id = CorrelationId::new();
    let bound = state.request_timeout;

    let status = match service {
        ServiceName::Orchestrator => {
            tokio::time::timeout(bound, state.coordinator.orchestrator_status(correlation_id))
                .await
                .map(|reply| reply.status)
                .unwrap_or(ServiceStatus::TimedOut)
        }
        ServiceName::Auth => settle(
            state
                .auth
                .status
                .request_within(AskForAuthServiceStatus { correlation_id }, bound)
                .await,
            |reply| reply.status,
        ),
        ServiceName::Learner => settle(
            state
                .learner
                .status
                .request_within(AskForLearnerServiceStatus { correlation_id }, bound)
                .await,
            |reply| reply.status,
        ),
        ServiceName::Order => settle(
            state
                .order
                .status
                .request_within(AskForOrderServiceStatus { correlation_id }, bound)
                .await,
            |reply| reply.status,
        ),
    };

    ServiceStatusResponse {
        correlation_id,
        service,
        status,
    }
}

/// GET /api/v1/status: every service, asked in parallel.
#[tracing::instrument(skip(state))]
pub async fn all<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Json<OverallStatusResponse> {
    let (orchestrator, auth, learner, order) = tokio::join!(
        ask(&state, ServiceName::Orchestrator),
        ask(&state, ServiceName::Auth),
        ask(&state, ServiceName::Learner),
        ask(&state, ServiceName::Order),
    );
    let services = vec![orchestrator, auth, learner, order];

    let status = services
        .iter()
        .map(|s| s.status)
        .find(|&s| s != ServiceStatus::Running)
        .unwrap_or(ServiceStatus::Running);

    Json(OverallStatusResponse { status, services })
}

/// GET /api/v1/status/{service}
#[tracing::instrument(skip(state))]
pub async fn one<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(service): Path<String>,
) -> Result<Json<ServiceStatusResponse>, ApiError> {
    let service: ServiceName = service.parse().map_err(ApiError::NotFound)?;
    Ok(Json(ask(&state, service).await))
}
