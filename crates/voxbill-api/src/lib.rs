//! API layer for VoxBill
//!
//! HTTP handlers for webhook ingestion, ledger statements, and admin
//! balance adjustments.

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{PaginationParams, WebhookAck, WebhookPayload};
pub use handlers::{configure_adjustments, configure_ledger, configure_webhooks};
pub use state::{build_services, AppServices, BillingPipeline};
