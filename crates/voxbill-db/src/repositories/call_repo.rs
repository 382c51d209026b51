//! Call repository implementation
//!
//! Provides PostgreSQL-backed storage for call records. Calls are never
//! deleted, so the repository intentionally exposes no delete operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voxbill_core::{
    models::{Call, CallState},
    traits::CallRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CALL_COLUMNS: &str = r#"
    id, external_call_id, origin_number, destination_number,
    destination_country, origin_country, state, duration_seconds,
    cost, flagged_for_audit, owner_user_id, created_at, ended_at
"#;

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self))]
    async fn find_by_external_id(&self, external_call_id: &str) -> AppResult<Option<Call>> {
        debug!("Finding call by external id: {}", external_call_id);

        let result = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            "SELECT {} FROM calls WHERE external_call_id = $1",
            CALL_COLUMNS
        ))
        .bind(external_call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call {}: {}", external_call_id, e);
            AppError::Database(format!("Failed to find call: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, call))]
    async fn insert(&self, call: &Call) -> AppResult<Call> {
        debug!("Creating call record: {}", call.external_call_id);

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            r#"
            INSERT INTO calls (
                id, external_call_id, origin_number, destination_number,
                destination_country, origin_country, state, duration_seconds,
                cost, flagged_for_audit, owner_user_id, created_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            CALL_COLUMNS
        ))
        .bind(call.id)
        .bind(&call.external_call_id)
        .bind(&call.origin_number)
        .bind(&call.destination_number)
        .bind(&call.destination_country)
        .bind(&call.origin_country)
        .bind(call.state.to_string())
        .bind(call.duration_seconds)
        .bind(call.cost)
        .bind(call.flagged_for_audit)
        .bind(call.owner_user_id)
        .bind(call.created_at)
        .bind(call.ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating call: {}", e);
            if e.to_string().contains("unique constraint") {
                AppError::AlreadyExists(format!("Call {} already exists", call.external_call_id))
            } else {
                AppError::Database(format!("Failed to create call: {}", e))
            }
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, call))]
    async fn update(&self, call: &Call) -> AppResult<Call> {
        debug!("Updating call: {}", call.external_call_id);

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            r#"
            UPDATE calls
            SET state = $2,
                duration_seconds = $3,
                cost = $4,
                flagged_for_audit = $5,
                owner_user_id = $6,
                ended_at = $7
            WHERE id = $1
            RETURNING {}
            "#,
            CALL_COLUMNS
        ))
        .bind(call.id)
        .bind(call.state.to_string())
        .bind(call.duration_seconds)
        .bind(call.cost)
        .bind(call.flagged_for_audit)
        .bind(call.owner_user_id)
        .bind(call.ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call {}: {}", call.id, e);
            AppError::Database(format!("Failed to update call: {}", e))
        })?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    external_call_id: String,
    origin_number: String,
    destination_number: String,
    destination_country: Option<String>,
    origin_country: Option<String>,
    state: String,
    duration_seconds: i32,
    cost: Option<Decimal>,
    flagged_for_audit: bool,
    owner_user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<CallRow> for Call {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            external_call_id: row.external_call_id,
            origin_number: row.origin_number,
            destination_number: row.destination_number,
            destination_country: row.destination_country,
            origin_country: row.origin_country,
            state: CallState::from_str(&row.state).unwrap_or(CallState::Initiated),
            duration_seconds: row.duration_seconds,
            cost: row.cost,
            flagged_for_audit: row.flagged_for_audit,
            owner_user_id: row.owner_user_id,
            created_at: row.created_at,
            ended_at: row.ended_at,
        }
    }
}
