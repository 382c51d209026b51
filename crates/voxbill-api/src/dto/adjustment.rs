//! Admin adjustment DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Manual balance adjustment request (admin UI collaborator)
///
/// The caller supplies the idempotency key so a resubmitted form cannot
/// apply twice.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustmentRequest {
    /// Signed delta; negative = debit
    pub amount: Decimal,

    /// Reason: "admin" or "refund"
    #[validate(length(min = 1, max = 16))]
    pub reason: String,

    /// Caller-supplied idempotency key
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
}

/// Adjustment outcome
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentResponse {
    pub entry_id: i64,
    pub new_balance: Decimal,
    /// True when the key had already been applied and no new delta ran
    pub duplicate: bool,
}
