//! Rate repository implementation
//!
//! Provides PostgreSQL-backed storage for rate entries. Lookup follows the
//! resolver contract: exact (destination, origin) pair first, then the
//! destination-wide fallback with no origin scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use voxbill_core::{models::RateEntry, traits::RateRepository, AppError, AppResult};

/// PostgreSQL implementation of RateRepository
pub struct PgRateRepository {
    pool: PgPool,
}

impl PgRateRepository {
    /// Create a new rate repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RATE_COLUMNS: &str = r#"
    id, destination_code, origin_context, per_minute_rate,
    currency, active, created_at, updated_at
"#;

#[async_trait]
impl RateRepository for PgRateRepository {
    #[instrument(skip(self))]
    async fn find_exact(
        &self,
        destination_code: &str,
        origin_context: &str,
    ) -> AppResult<Option<RateEntry>> {
        debug!(
            "Finding exact rate for destination {} origin {}",
            destination_code, origin_context
        );

        let result = sqlx::query_as::<sqlx::Postgres, RateEntryRow>(&format!(
            r#"
            SELECT {}
            FROM rate_entries
            WHERE destination_code = $1
              AND origin_context = $2
              AND active = TRUE
            "#,
            RATE_COLUMNS
        ))
        .bind(destination_code)
        .bind(origin_context)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding rate for {}/{}: {}",
                destination_code, origin_context, e
            );
            AppError::Database(format!("Failed to find rate: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_fallback(&self, destination_code: &str) -> AppResult<Option<RateEntry>> {
        debug!("Finding fallback rate for destination {}", destination_code);

        let result = sqlx::query_as::<sqlx::Postgres, RateEntryRow>(&format!(
            r#"
            SELECT {}
            FROM rate_entries
            WHERE destination_code = $1
              AND origin_context IS NULL
              AND active = TRUE
            "#,
            RATE_COLUMNS
        ))
        .bind(destination_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding fallback rate for {}: {}",
                destination_code, e
            );
            AppError::Database(format!("Failed to find rate: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RateEntryRow {
    id: i32,
    destination_code: String,
    origin_context: Option<String>,
    per_minute_rate: Decimal,
    currency: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RateEntryRow> for RateEntry {
    fn from(row: RateEntryRow) -> Self {
        Self {
            id: row.id,
            destination_code: row.destination_code,
            origin_context: row.origin_context,
            per_minute_rate: row.per_minute_rate,
            currency: row.currency,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
