use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};
use tokio::sync::RwLock;

use crate::{Result, SagaInstance, SagaRepository, SagaState, StoreError, Version};

/// In-memory saga repository for tests and single-process deployments.
///
/// Enforces the same uniqueness and version rules as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    sagas: Arc<RwLock<HashMap<CorrelationId, SagaInstance>>>,
    unavailable: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemorySagaRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }

    /// Returns every stored saga.
    pub async fn all(&self) -> Vec<SagaInstance> {
        self.sagas.read().await.values().cloned().collect()
    }

    /// Clears all sagas.
    pub async fn clear(&self) {
        self.sagas.write().await.clear();
    }

    /// Makes every operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every operation by `latency`. Zero turns the delay off.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    async fn check_available(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory repository switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn insert(&self, saga: &SagaInstance) -> Result<Version> {
        self.check_available().await?;
        let mut sagas = self.sagas.write().await;

        if sagas.contains_key(&saga.correlation_id) {
            return Err(StoreError::Duplicate(format!(
                "correlation id {}",
                saga.correlation_id
            )));
        }
        for existing in sagas.values() {
            if existing.request_id == saga.request_id {
                return Err(StoreError::Duplicate(format!(
                    "request id {}",
                    saga.request_id
                )));
            }
            if existing.aggregate_id == saga.aggregate_id {
                return Err(StoreError::Duplicate(format!(
                    "aggregate id {}",
                    saga.aggregate_id
                )));
            }
        }

        let mut stored = saga.clone();
        stored.version = Version::first();
        sagas.insert(stored.correlation_id, stored);

        Ok(Version::first())
    }

    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance>> {
        self.check_available().await?;
        let sagas = self.sagas.read().await;
        Ok(sagas.get(&correlation_id).cloned())
    }

    async fn find_by_request(&self, request_id: CorrelationId) -> Result<Option<SagaInstance>> {
        self.check_available().await?;
        let sagas = self.sagas.read().await;
        Ok(sagas
            .values()
            .find(|s| s.request_id == request_id)
            .cloned())
    }

    async fn find_by_aggregate(&self, aggregate_id: AggregateId) -> Result<Option<SagaInstance>> {
        self.check_available().await?;
        let sagas = self.sagas.read().await;
        Ok(sagas
            .values()
            .find(|s| s.aggregate_id == aggregate_id)
            .cloned())
    }

    async fn update(&self, saga: &SagaInstance) -> Result<Version> {
        self.check_available().await?;
        let mut sagas = self.sagas.write().await;

        let stored = sagas
            .get_mut(&saga.correlation_id)
            .ok_or(StoreError::NotFound(saga.correlation_id))?;

        if stored.version != saga.version {
            return Err(StoreError::ConcurrencyConflict {
                correlation_id: saga.correlation_id,
                expected: saga.version,
                actual: stored.version,
            });
        }

        let next = saga.version.next();
        *stored = saga.clone();
        stored.version = next;

        Ok(next)
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>> {
        self.check_available().await?;
        let sagas = self.sagas.read().await;
        let mut due: Vec<_> = sagas.values().filter(|s| s.is_due(now)).cloned().collect();

        due.sort_by_key(|s| s.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available().await
    }
}
