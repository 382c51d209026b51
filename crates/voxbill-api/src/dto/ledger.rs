//! Ledger statement DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use voxbill_core::models::LedgerEntry;

/// One statement line
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub amount: Decimal,
    pub reason: String,
    pub related_call_id: Option<Uuid>,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            amount: entry.amount,
            reason: entry.reason.to_string(),
            related_call_id: entry.related_call_id,
            balance_after: entry.balance_after,
            created_at: entry.created_at,
        }
    }
}

/// Current balance snapshot
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: Decimal,
}
