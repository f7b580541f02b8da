//! HTTP gateway for the saga coordinator and its services.
//!
//! Opens user and course sagas, exposes saga state for polling, reports the
//! liveness of every service, and forwards login and order placement. Every
//! call the gateway makes is bounded; a call that runs out of time answers
//! `TIMED_OUT` instead of a server error.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::SagaRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Runtime, create_default_state, create_postgres_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: SagaRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/v1/status", get(routes::status::all::<R>))
        .route("/api/v1/status/{service}", get(routes::status::one::<R>))
        .route("/api/v1/users", post(routes::sagas::create_user::<R>))
        .route("/api/v1/courses", post(routes::sagas::create_course::<R>))
        .route("/api/v1/sagas/{id}", get(routes::sagas::get::<R>))
        .route("/api/v1/orders", post(routes::orders::create::<R>))
        .route("/api/v1/auth/token", post(routes::auth::token::<R>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
