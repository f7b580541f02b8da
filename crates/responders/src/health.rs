//! Liveness checks and write accounting shared by every responder.

use std::future::Future;
use std::time::Duration;

use common::{ServiceName, ServiceStatus};

use crate::Result;
use crate::store::Inserted;

/// Longest a status check may take before the service reports itself degraded.
pub const CHECK_BOUND: Duration = Duration::from_secs(2);

/// Runs a read-only store check under [`CHECK_BOUND`].
pub(crate) async fn check_status<F>(service: ServiceName, check: F) -> ServiceStatus
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(CHECK_BOUND, check).await {
        Ok(Ok(())) => ServiceStatus::Running,
        Ok(Err(e)) => {
            tracing::warn!(service = service.as_str(), error = %e, "status check failed");
            ServiceStatus::Degraded
        }
        Err(_) => {
            tracing::warn!(service = service.as_str(), bound = ?CHECK_BOUND, "status check timed out");
            ServiceStatus::Degraded
        }
    }
}

pub(crate) fn record_write<E>(service: ServiceName, entity: &'static str, inserted: &Inserted<E>) {
    if inserted.is_created() {
        metrics::counter!("responder_writes_total", "service" => service.as_str(), "entity" => entity)
            .increment(1);
    } else {
        tracing::debug!(service = service.as_str(), entity, "row already present");
        metrics::counter!("responder_duplicates_total", "service" => service.as_str(), "entity" => entity)
            .increment(1);
    }
}
