use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};

use crate::{Result, SagaInstance, StoreError, Version};

/// Durable store of saga instances.
///
/// Every write is conditional. Callers mutate a copy read at some version and
/// hand it back; the write succeeds only if the row is still at that version.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Inserts a new saga and returns its first version.
    ///
    /// Fails with `Duplicate` if the correlation, request or aggregate id is
    /// already taken.
    async fn insert(&self, saga: &SagaInstance) -> Result<Version>;

    /// Retrieves a saga by correlation id.
    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance>>;

    /// Retrieves the saga opened by a top-level request.
    async fn find_by_request(&self, request_id: CorrelationId) -> Result<Option<SagaInstance>>;

    /// Retrieves the saga that minted an aggregate id.
    async fn find_by_aggregate(&self, aggregate_id: AggregateId) -> Result<Option<SagaInstance>>;

    /// Writes `saga` if the stored row is still at `saga.version`.
    ///
    /// Returns the new version, or `ConcurrencyConflict` if another writer
    /// got there first.
    async fn update(&self, saga: &SagaInstance) -> Result<Version>;

    /// AwaitingChildren sagas whose next attempt is due at `now`, longest
    /// overdue first.
    ///
    /// Sagas still backing off are never returned, so they cannot crowd due
    /// ones out of the batch.
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>>;

    /// Cheap read used as a liveness check.
    async fn ping(&self) -> Result<()>;
}

/// Extension trait providing convenience methods for saga repositories.
#[async_trait]
pub trait SagaRepositoryExt: SagaRepository {
    /// Retrieves a saga, failing with `NotFound` if it does not exist.
    async fn get_required(&self, correlation_id: CorrelationId) -> Result<SagaInstance> {
        self.get(correlation_id)
            .await?
            .ok_or(StoreError::NotFound(correlation_id))
    }

    /// Inserts a saga and stamps the stored version onto it.
    async fn insert_new(&self, saga: &mut SagaInstance) -> Result<()> {
        saga.version = self.insert(saga).await?;
        Ok(())
    }

    /// Conditionally writes a saga and stamps the new version onto it.
    async fn save(&self, saga: &mut SagaInstance) -> Result<()> {
        saga.version = self.update(saga).await?;
        Ok(())
    }
}

// Blanket implementation for all SagaRepository implementations
impl<T: SagaRepository + ?Sized> SagaRepositoryExt for T {}
