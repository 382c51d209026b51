//! Data transfer objects for the VoxBill API

pub mod adjustment;
pub mod ledger;
pub mod webhook;

pub use adjustment::{AdjustmentRequest, AdjustmentResponse};
pub use ledger::{BalanceResponse, LedgerEntryResponse};
pub use webhook::{WebhookAck, WebhookPayload};

use serde::Deserialize;

/// Common pagination query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    /// Page number (1-based)
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}
