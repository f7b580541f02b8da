use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::{ResponderError, Result};

/// A row owned by one dependent service, keyed by aggregate id.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table backing this entity in PostgreSQL.
    const TABLE: &'static str;

    fn aggregate_id(&self) -> AggregateId;

    /// Fields that must be unique across entities of this type.
    fn unique_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Outcome of an insert-if-absent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted<E> {
    /// The row was written by this call.
    Created(E),
    /// A row for the aggregate id already existed; it is returned unchanged.
    Existing(E),
}

impl<E> Inserted<E> {
    pub fn is_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }

    pub fn entity(&self) -> &E {
        match self {
            Inserted::Created(e) | Inserted::Existing(e) => e,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Inserted::Created(e) | Inserted::Existing(e) => e,
        }
    }
}

/// A service's local store for one entity type.
///
/// `insert_if_absent` is the only write. It is atomic with respect to
/// concurrent writes for the same aggregate id, which is what makes child
/// commands safe to redeliver.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Writes `entity` unless a row for its aggregate id exists.
    ///
    /// Fails with `Conflict` if a different aggregate already holds one of the
    /// entity's unique fields.
    async fn insert_if_absent(&self, entity: E) -> Result<Inserted<E>>;

    async fn find(&self, aggregate_id: AggregateId) -> Result<Option<E>>;

    /// Looks up an entity by one of its unique fields.
    async fn find_by_unique(&self, field: &str, value: &str) -> Result<Option<E>>;

    /// Read-only liveness check against the store.
    async fn ping(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// In-memory entity store for tests and single-process deployments.
pub struct InMemoryEntityStore<E> {
    rows: Arc<RwLock<HashMap<AggregateId, E>>>,
    unavailable: Arc<AtomicBool>,
}

impl<E> Clone for InMemoryEntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            unavailable: Arc::clone(&self.unavailable),
        }
    }
}

impl<E> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<E> InMemoryEntityStore<E> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ResponderError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for InMemoryEntityStore<E> {
    async fn insert_if_absent(&self, entity: E) -> Result<Inserted<E>> {
        self.check_available()?;
        let mut rows = self.rows.write().await;

        if let Some(existing) = rows.get(&entity.aggregate_id()) {
            return Ok(Inserted::Existing(existing.clone()));
        }

        for (field, value) in entity.unique_fields() {
            let taken = rows.values().any(|row| {
                row.unique_fields()
                    .iter()
                    .any(|(f, v)| *f == field && *v == value)
            });
            if taken {
                return Err(ResponderError::Conflict(format!(
                    "{field} already registered"
                )));
            }
        }

        rows.insert(entity.aggregate_id(), entity.clone());
        Ok(Inserted::Created(entity))
    }

    async fn find(&self, aggregate_id: AggregateId) -> Result<Option<E>> {
        self.check_available()?;
        Ok(self.rows.read().await.get(&aggregate_id).cloned())
    }

    async fn find_by_unique(&self, field: &str, value: &str) -> Result<Option<E>> {
        self.check_available()?;
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|row| {
                row.unique_fields()
                    .iter()
                    .any(|(f, v)| *f == field && v == value)
            })
            .cloned())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()?;
        let _first = self.rows.read().await.values().next().cloned();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.check_available()?;
        Ok(self.rows.read().await.len())
    }
}
