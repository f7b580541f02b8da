use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ChildKind, Result, SagaInstance, SagaRepository, SagaState, SagaType, StoreError, Version,
};

const SAGA_COLUMNS: &str = "correlation_id, request_id, aggregate_id, saga_type, state, payload, \
     created_at, last_attempt_at, next_attempt_at, attempt_count, expected_children, \
     confirmed_children, failure_reason, version";

/// PostgreSQL-backed saga repository.
#[derive(Clone)]
pub struct PostgresSagaRepository {
    pool: PgPool,
}

impl PostgresSagaRepository {
    /// Creates a new PostgreSQL saga repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_saga(row: PgRow) -> Result<SagaInstance> {
        let saga_type: String = row.try_get("saga_type")?;
        let state: String = row.try_get("state")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let attempt_count: i64 = row.try_get("attempt_count")?;
        let expected: Vec<String> = row.try_get("expected_children")?;
        let confirmed: Vec<String> = row.try_get("confirmed_children")?;

        Ok(SagaInstance {
            correlation_id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            request_id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("request_id")?),
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            saga_type: saga_type.parse::<SagaType>().map_err(StoreError::Corrupt)?,
            state: state.parse::<SagaState>().map_err(StoreError::Corrupt)?,
            payload: serde_json::from_value(payload)?,
            created_at: row.try_get("created_at")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            attempt_count: u32::try_from(attempt_count)
                .map_err(|_| StoreError::Corrupt(format!("attempt count {attempt_count}")))?,
            expected_children: parse_children(&expected)?,
            confirmed_children: parse_children(&confirmed)?,
            failure_reason: row.try_get("failure_reason")?,
            version: Version::new(row.try_get("version")?),
        })
    }

    async fn fetch_one_by(&self, column: &str, id: Uuid) -> Result<Option<SagaInstance>> {
        let sql = format!("SELECT {SAGA_COLUMNS} FROM sagas WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_saga).transpose()
    }
}

fn parse_children(names: &[String]) -> Result<BTreeSet<ChildKind>> {
    names
        .iter()
        .map(|name| name.parse::<ChildKind>().map_err(StoreError::Corrupt))
        .collect()
}

fn child_names(children: &BTreeSet<ChildKind>) -> Vec<String> {
    children.iter().map(|c| c.as_str().to_string()).collect()
}

#[async_trait]
impl SagaRepository for PostgresSagaRepository {
    async fn insert(&self, saga: &SagaInstance) -> Result<Version> {
        let payload = serde_json::to_value(&saga.payload)?;

        sqlx::query(
            r#"
            INSERT INTO sagas (correlation_id, request_id, aggregate_id, saga_type, state, payload,
                               created_at, last_attempt_at, next_attempt_at, attempt_count,
                               expected_children, confirmed_children, failure_reason, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(saga.correlation_id.as_uuid())
        .bind(saga.request_id.as_uuid())
        .bind(saga.aggregate_id.as_uuid())
        .bind(saga.saga_type.as_str())
        .bind(saga.state.as_str())
        .bind(payload)
        .bind(saga.created_at)
        .bind(saga.last_attempt_at)
        .bind(saga.next_attempt_at)
        .bind(i64::from(saga.attempt_count))
        .bind(child_names(&saga.expected_children))
        .bind(child_names(&saga.confirmed_children))
        .bind(&saga.failure_reason)
        .bind(Version::first().as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Duplicate(
                    db_err.constraint().unwrap_or("sagas_pkey").to_string(),
                );
            }
            StoreError::Database(e)
        })?;

        Ok(Version::first())
    }

    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance>> {
        self.fetch_one_by("correlation_id", correlation_id.as_uuid())
            .await
    }

    async fn find_by_request(&self, request_id: CorrelationId) -> Result<Option<SagaInstance>> {
        self.fetch_one_by("request_id", request_id.as_uuid()).await
    }

    async fn find_by_aggregate(&self, aggregate_id: AggregateId) -> Result<Option<SagaInstance>> {
        self.fetch_one_by("aggregate_id", aggregate_id.as_uuid())
            .await
    }

    async fn update(&self, saga: &SagaInstance) -> Result<Version> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE sagas
            SET state = $3,
                last_attempt_at = $4,
                next_attempt_at = $5,
                attempt_count = $6,
                confirmed_children = $7,
                failure_reason = $8,
                version = version + 1
            WHERE correlation_id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(saga.correlation_id.as_uuid())
        .bind(saga.version.as_i64())
        .bind(saga.state.as_str())
        .bind(saga.last_attempt_at)
        .bind(saga.next_attempt_at)
        .bind(i64::from(saga.attempt_count))
        .bind(child_names(&saga.confirmed_children))
        .bind(&saga.failure_reason)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(Version::new(version));
        }

        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM sagas WHERE correlation_id = $1")
                .bind(saga.correlation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match actual {
            Some(actual) => Err(StoreError::ConcurrencyConflict {
                correlation_id: saga.correlation_id,
                expected: saga.version,
                actual: Version::new(actual),
            }),
            None => Err(StoreError::NotFound(saga.correlation_id)),
        }
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>> {
        let sql = format!(
            "SELECT {SAGA_COLUMNS} FROM sagas \
             WHERE state = 'AwaitingChildren' AND next_attempt_at <= $1 \
             ORDER BY next_attempt_at ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_saga).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
