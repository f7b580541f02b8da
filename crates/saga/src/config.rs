//! Coordinator and reconciler settings loaded from environment variables.

use std::time::Duration;

use crate::backoff::Backoff;

/// Timing and retry limits shared by the coordinator and the reconciler.
///
/// Reads from environment variables:
/// - `SAGA_CALL_TIMEOUT_MS`: per child call (default: `5000`)
/// - `SAGA_RECONCILE_INTERVAL_MS`: reconciler tick (default: `1000`)
/// - `SAGA_STALE_AFTER_MS`: age before a saga is retried, also the backoff base (default: `10000`)
/// - `SAGA_BACKOFF_MAX_MS`: backoff ceiling (default: `300000`)
/// - `SAGA_MAX_ATTEMPTS`: dispatch rounds before giving up (default: `5`)
/// - `SAGA_BATCH_SIZE`: sagas scanned per tick (default: `100`)
/// - `SAGA_MAX_UPDATE_RETRIES`: re-reads after a version conflict (default: `8`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub call_timeout: Duration,
    pub reconcile_interval: Duration,
    pub stale_after: Duration,
    pub backoff_max: Duration,
    pub max_attempts: u32,
    pub batch_size: usize,
    pub max_update_retries: u32,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            call_timeout: millis("SAGA_CALL_TIMEOUT_MS").unwrap_or(defaults.call_timeout),
            reconcile_interval: millis("SAGA_RECONCILE_INTERVAL_MS")
                .unwrap_or(defaults.reconcile_interval),
            stale_after: millis("SAGA_STALE_AFTER_MS").unwrap_or(defaults.stale_after),
            backoff_max: millis("SAGA_BACKOFF_MAX_MS").unwrap_or(defaults.backoff_max),
            max_attempts: std::env::var("SAGA_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_attempts),
            batch_size: std::env::var("SAGA_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.batch_size),
            max_update_retries: std::env::var("SAGA_MAX_UPDATE_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_update_retries),
        }
    }

    /// Retry schedule: `stale_after` doubled per round, capped at `backoff_max`.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.stale_after, self.backoff_max)
    }
}

fn millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(10),
            backoff_max: Duration::from_secs(300),
            max_attempts: 5,
            batch_size: 100,
            max_update_retries: 8,
        }
    }
}
