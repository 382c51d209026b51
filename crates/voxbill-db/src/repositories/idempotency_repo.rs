//! Idempotency store implementation
//!
//! The admit check and the record insert are one atomic statement: an
//! `INSERT ... ON CONFLICT DO NOTHING` against the primary key. Two
//! concurrent deliveries of the same event key admit exactly one; the loser
//! observes zero affected rows.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use voxbill_core::{
    models::Admission,
    traits::IdempotencyStore,
    AppError, AppResult,
};

/// PostgreSQL implementation of IdempotencyStore
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    /// Create a new idempotency store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    #[instrument(skip(self))]
    async fn admit(&self, event_key: &str) -> AppResult<Admission> {
        debug!("Admitting event key: {}", event_key);

        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_records (event_key)
            VALUES ($1)
            ON CONFLICT (event_key) DO NOTHING
            "#,
        )
        .bind(event_key)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error admitting event {}: {}", event_key, e);
            AppError::Database(format!("Failed to admit event: {}", e))
        })?;

        if result.rows_affected() == 1 {
            Ok(Admission::Admitted)
        } else {
            debug!("Event {} already processed", event_key);
            Ok(Admission::AlreadyProcessed)
        }
    }

    #[instrument(skip(self))]
    async fn complete(&self, event_key: &str, outcome_summary: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE idempotency_records SET outcome_summary = $2 WHERE event_key = $1",
        )
        .bind(event_key)
        .bind(outcome_summary)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error completing event {}: {}", event_key, e);
            AppError::Database(format!("Failed to complete event: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn release(&self, event_key: &str) -> AppResult<()> {
        debug!("Releasing event key after pipeline failure: {}", event_key);

        sqlx::query("DELETE FROM idempotency_records WHERE event_key = $1")
            .bind(event_key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error releasing event {}: {}", event_key, e);
                AppError::Database(format!("Failed to release event: {}", e))
            })?;

        Ok(())
    }
}
