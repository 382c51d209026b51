//! Ledger entry model
//!
//! Immutable, append-only audit records of every balance change. The sum of
//! a user's ledger amounts equals the user's balance at all times; entries
//! are never updated or deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reason a balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Debit for a finalized call
    Call,
    /// Credit from an automatic or manual top-up
    Topup,
    /// Refund issued to the user
    Refund,
    /// Manual administrative adjustment
    Admin,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerReason::Call => write!(f, "call"),
            LedgerReason::Topup => write!(f, "topup"),
            LedgerReason::Refund => write!(f, "refund"),
            LedgerReason::Admin => write!(f, "admin"),
        }
    }
}

impl LedgerReason {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "call" => Some(LedgerReason::Call),
            "topup" => Some(LedgerReason::Topup),
            "refund" => Some(LedgerReason::Refund),
            "admin" => Some(LedgerReason::Admin),
            _ => None,
        }
    }
}

/// Ledger entry entity
///
/// One immutable record explaining one balance change. The `idempotency_key`
/// is unique; a second write with the same key returns the already-recorded
/// outcome instead of applying the delta again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier
    pub id: i64,

    /// Owning user
    pub user_id: Uuid,

    /// Signed monetary delta; negative = debit
    pub amount: Decimal,

    /// Why the balance changed
    pub reason: LedgerReason,

    /// Call that produced this entry, if any
    pub related_call_id: Option<Uuid>,

    /// Unique key enforcing exactly-once application
    pub idempotency_key: String,

    /// Balance resulting from this entry
    pub balance_after: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Check if this entry reduced the balance
    #[inline]
    pub fn is_debit(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Check if this entry increased the balance
    #[inline]
    pub fn is_credit(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

/// Outcome of a ledger application
///
/// `duplicate` is true when the idempotency key had already been recorded and
/// the returned entry/balance are the previously recorded outcome.
#[derive(Debug, Clone)]
pub struct AppliedTransaction {
    pub entry: LedgerEntry,
    pub new_balance: Decimal,
    pub duplicate: bool,
}
