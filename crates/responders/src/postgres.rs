use std::marker::PhantomData;

use async_trait::async_trait;
use common::AggregateId;
use sqlx::PgPool;

use crate::store::{Entity, EntityStore, Inserted};
use crate::{ResponderError, Result};

/// PostgreSQL-backed entity store. One table per entity type, body as JSONB.
pub struct PostgresEntityStore<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for PostgresEntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> PostgresEntityStore<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for PostgresEntityStore<E> {
    async fn insert_if_absent(&self, entity: E) -> Result<Inserted<E>> {
        let aggregate_id = entity.aggregate_id();
        let body = serde_json::to_value(&entity)?;

        let sql = format!(
            "INSERT INTO {} (aggregate_id, body) VALUES ($1, $2) \
             ON CONFLICT (aggregate_id) DO NOTHING RETURNING aggregate_id",
            E::TABLE
        );
        let written: Option<uuid::Uuid> = sqlx::query_scalar(&sql)
            .bind(aggregate_id.as_uuid())
            .bind(body)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                // The primary key is covered by ON CONFLICT; any other unique
                // violation is a collision on a unique field.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return ResponderError::Conflict(format!(
                        "{} violates {}",
                        E::TABLE,
                        db_err.constraint().unwrap_or("a unique constraint")
                    ));
                }
                ResponderError::Database(e)
            })?;

        if written.is_some() {
            return Ok(Inserted::Created(entity));
        }

        self.find(aggregate_id)
            .await?
            .map(Inserted::Existing)
            .ok_or_else(|| {
                ResponderError::Unavailable(format!(
                    "{} row {aggregate_id} neither inserted nor found",
                    E::TABLE
                ))
            })
    }

    async fn find(&self, aggregate_id: AggregateId) -> Result<Option<E>> {
        let sql = format!("SELECT body FROM {} WHERE aggregate_id = $1", E::TABLE);
        let body: Option<serde_json::Value> = sqlx::query_scalar(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        body.map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    async fn find_by_unique(&self, field: &str, value: &str) -> Result<Option<E>> {
        let sql = format!("SELECT body FROM {} WHERE body->>$1 = $2", E::TABLE);
        let body: Option<serde_json::Value> = sqlx::query_scalar(&sql)
            .bind(field)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        body.map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    async fn ping(&self) -> Result<()> {
        let sql = format!("SELECT aggregate_id FROM {} LIMIT 1", E::TABLE);
        let _first: Option<uuid::Uuid> = sqlx::query_scalar(&sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
