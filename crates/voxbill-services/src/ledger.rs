//! Ledger and balance manager
//!
//! Wraps the atomic ledger repository write with bounded retry/backoff for
//! transient conflicts. This is the only component permitted to change a
//! user's balance; everything else goes through `apply_transaction`.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use voxbill_core::{
    models::{AppliedTransaction, LedgerEntry, LedgerReason},
    traits::LedgerRepository,
    AppResult,
};

use crate::constants::{LEDGER_MAX_RETRIES, LEDGER_RETRY_BACKOFF_MS};

/// Ledger and balance manager
pub struct LedgerManager<L: LedgerRepository> {
    repo: Arc<L>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl<L: LedgerRepository> LedgerManager<L> {
    /// Create a new ledger manager with default retry settings
    pub fn new(repo: Arc<L>) -> Self {
        Self::with_retries(repo, LEDGER_MAX_RETRIES, LEDGER_RETRY_BACKOFF_MS)
    }

    /// Create a new ledger manager with explicit retry settings
    pub fn with_retries(repo: Arc<L>, max_retries: u32, retry_backoff_ms: u64) -> Self {
        Self {
            repo,
            max_retries: max_retries.max(1),
            retry_backoff_ms,
        }
    }

    /// Atomically apply a signed delta to a user's balance
    ///
    /// A duplicate `idempotency_key` returns the already-recorded outcome.
    /// Transient write conflicts are retried with linear backoff; retrying is
    /// safe because the operation is keyed. Debits are recorded as observed
    /// even when they drive the balance negative.
    #[instrument(skip(self))]
    pub async fn apply_transaction(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: LedgerReason,
        idempotency_key: &str,
        related_call_id: Option<Uuid>,
    ) -> AppResult<AppliedTransaction> {
        let mut attempt: u32 = 0;

        loop {
            match self
                .repo
                .apply(user_id, amount, reason, idempotency_key, related_call_id)
                .await
            {
                Ok(applied) => {
                    if applied.duplicate {
                        debug!(
                            "Ledger key {} already applied, returning recorded outcome",
                            idempotency_key
                        );
                    } else {
                        debug!(
                            "Applied {} ({}) for user {}, new balance {}",
                            amount, reason, user_id, applied.new_balance
                        );
                    }
                    return Ok(applied);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Ledger write conflict for {} (attempt {}/{}): {}",
                        idempotency_key, attempt, self.max_retries, e
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.retry_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current balance for a user
    pub async fn balance_of(&self, user_id: Uuid) -> AppResult<Decimal> {
        self.repo.balance_of(user_id).await
    }

    /// Paginated, newest-first statement for a user
    pub async fn statement(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<LedgerEntry>, i64)> {
        self.repo.list_for_user(user_id, limit, offset).await
    }
}
