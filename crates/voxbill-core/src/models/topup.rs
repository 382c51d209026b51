//! Auto top-up policy model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user auto top-up configuration
///
/// Read by the top-up trigger after ledger mutations; never written by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTopupPolicy {
    /// Owning user
    pub user_id: Uuid,

    /// Whether automatic top-ups are enabled
    pub enabled: bool,

    /// Balance threshold below which a top-up is requested
    pub threshold: Decimal,

    /// Amount charged per top-up
    pub topup_amount: Decimal,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AutoTopupPolicy {
    /// Check whether a balance should trigger a top-up under this policy
    #[inline]
    pub fn should_trigger(&self, balance: Decimal) -> bool {
        self.enabled && self.topup_amount > Decimal::ZERO && balance < self.threshold
    }
}

/// Outcome of a top-up check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopupOutcome {
    /// A top-up was requested and credited
    Triggered(Decimal),
    /// Balance is above threshold or the policy is disabled/absent
    NotNeeded,
    /// Another top-up request for this user has not yet completed
    AlreadyInFlight,
    /// The payment gateway declined, errored, or timed out
    Failed(String),
}
