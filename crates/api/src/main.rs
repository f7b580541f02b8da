//! API server entry point.

use api::config::Config;
use api::{Runtime, create_app};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::SagaRepository;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves HTTP and runs the reconciler until shutdown, then drains in-flight
/// dispatches.
async fn run<R: SagaRepository + 'static>(
    runtime: Runtime<R>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let Runtime {
        state,
        reconciler,
        handles,
    } = runtime;

    let (stop_tx, stop_rx) = watch::channel(false);
    let reconciler_task = tokio::spawn(reconciler.run(stop_rx));

    let app = create_app(state.clone(), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Stop retrying first, then let dispatches already in flight finish.
    let _ = stop_tx.send(true);
    if let Err(error) = reconciler_task.await {
        tracing::error!(%error, "reconciler task failed");
    }
    let drained = state.coordinator.wait_for_dispatches().await;
    tracing::info!(dispatches = drained.len(), "in-flight dispatches finished");

    for handle in handles {
        handle.shutdown();
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set, signing tokens with the development secret");
    }

    // 3. Wire stores, responders, coordinator and reconciler
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let runtime = api::create_postgres_state(&config, pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            run(runtime, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            run(api::create_default_state(&config), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
