//! Auto top-up policy repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voxbill_core::{
    models::AutoTopupPolicy,
    traits::TopupPolicyRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of TopupPolicyRepository
pub struct PgTopupPolicyRepository {
    pool: PgPool,
}

impl PgTopupPolicyRepository {
    /// Create a new top-up policy repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TopupPolicyRepository for PgTopupPolicyRepository {
    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: Uuid) -> AppResult<Option<AutoTopupPolicy>> {
        debug!("Finding top-up policy for user: {}", user_id);

        let result = sqlx::query_as::<sqlx::Postgres, PolicyRow>(
            r#"
            SELECT user_id, enabled, threshold, topup_amount, updated_at
            FROM auto_topup_policies
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding top-up policy for {}: {}",
                user_id, e
            );
            AppError::Database(format!("Failed to find top-up policy: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct PolicyRow {
    user_id: Uuid,
    enabled: bool,
    threshold: Decimal,
    topup_amount: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<PolicyRow> for AutoTopupPolicy {
    fn from(row: PolicyRow) -> Self {
        Self {
            user_id: row.user_id,
            enabled: row.enabled,
            threshold: row.threshold,
            topup_amount: row.topup_amount,
            updated_at: row.updated_at,
        }
    }
}
