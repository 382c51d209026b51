//! Ledger repository implementation
//!
//! The single write path for balances. `apply` runs one transaction that
//! locks the user's balance row (`FOR UPDATE`), appends the immutable ledger
//! entry, and persists the new balance, so two simultaneous debits for the
//! same user can never both read the same starting balance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use voxbill_core::{
    models::{AppliedTransaction, LedgerEntry, LedgerReason},
    traits::LedgerRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of LedgerRepository
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the already-recorded entry for an idempotency key
    async fn find_by_key(&self, idempotency_key: &str) -> AppResult<Option<LedgerEntry>> {
        let result = sqlx::query_as::<sqlx::Postgres, LedgerRow>(&format!(
            "SELECT {} FROM ledger_entries WHERE idempotency_key = $1",
            LEDGER_COLUMNS
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding ledger entry by key {}: {}",
                idempotency_key, e
            );
            AppError::Database(format!("Failed to find ledger entry: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

const LEDGER_COLUMNS: &str = r#"
    id, user_id, amount, reason, related_call_id,
    idempotency_key, balance_after, created_at
"#;

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    #[instrument(skip(self))]
    async fn apply(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: LedgerReason,
        idempotency_key: &str,
        related_call_id: Option<Uuid>,
    ) -> AppResult<AppliedTransaction> {
        debug!(
            "Applying ledger transaction for user {}: {} ({})",
            user_id, amount, reason
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        // Row lock serializes concurrent balance mutations for this user.
        let balance_row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Database error locking balance for {}: {}", user_id, e);
                    AppError::Transaction(format!("Failed to lock balance row: {}", e))
                })?;

        let Some((balance,)) = balance_row else {
            tx.rollback().await.ok();
            return Err(AppError::UserNotFound(user_id.to_string()));
        };

        let new_balance = balance + amount;

        let inserted = sqlx::query_as::<sqlx::Postgres, LedgerRow>(&format!(
            r#"
            INSERT INTO ledger_entries (
                user_id, amount, reason, related_call_id,
                idempotency_key, balance_after
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .bind(reason.to_string())
        .bind(related_call_id)
        .bind(idempotency_key)
        .bind(new_balance)
        .fetch_one(&mut *tx)
        .await;

        let entry_row = match inserted {
            Ok(row) => row,
            Err(e) if e.to_string().contains("unique constraint") => {
                // Second delivery of the same key: return the recorded
                // outcome without applying the delta again.
                tx.rollback().await.ok();
                warn!(
                    "Duplicate ledger key {}, returning recorded outcome",
                    idempotency_key
                );

                let existing = self.find_by_key(idempotency_key).await?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "Ledger key {} violated uniqueness but is not readable",
                        idempotency_key
                    ))
                })?;

                let balance_after = existing.balance_after;
                return Ok(AppliedTransaction {
                    entry: existing,
                    new_balance: balance_after,
                    duplicate: true,
                });
            }
            Err(e) => {
                tx.rollback().await.ok();
                error!("Database error inserting ledger entry: {}", e);
                return Err(AppError::Database(format!(
                    "Failed to insert ledger entry: {}",
                    e
                )));
            }
        };

        sqlx::query("UPDATE users SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error updating balance for {}: {}", user_id, e);
                AppError::Transaction(format!("Failed to update balance: {}", e))
            })?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit: {}", e)))?;

        Ok(AppliedTransaction {
            entry: entry_row.into(),
            new_balance,
            duplicate: false,
        })
    }

    #[instrument(skip(self))]
    async fn balance_of(&self, user_id: Uuid) -> AppResult<Decimal> {
        let result: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error reading balance for {}: {}", user_id, e);
                    AppError::Database(format!("Failed to read balance: {}", e))
                })?;

        result
            .map(|(b,)| b)
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<LedgerEntry>, i64)> {
        debug!(
            "Listing ledger entries for {} limit {} offset {}",
            user_id, limit, offset
        );

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ledger_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting ledger entries: {}", e);
                    AppError::Database(format!("Failed to count ledger entries: {}", e))
                })?;

        let rows = sqlx::query_as::<sqlx::Postgres, LedgerRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing ledger entries: {}", e);
            AppError::Database(format!("Failed to list ledger entries: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    user_id: Uuid,
    amount: Decimal,
    reason: String,
    related_call_id: Option<Uuid>,
    idempotency_key: String,
    balance_after: Decimal,
    created_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            reason: LedgerReason::from_str(&row.reason).unwrap_or(LedgerReason::Admin),
            related_call_id: row.related_call_id,
            idempotency_key: row.idempotency_key,
            balance_after: row.balance_after,
            created_at: row.created_at,
        }
    }
}
