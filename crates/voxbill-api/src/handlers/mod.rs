//! HTTP handlers for VoxBill

pub mod adjustment;
pub mod ledger;
pub mod webhook;

pub use adjustment::configure_adjustments;
pub use ledger::configure_ledger;
pub use webhook::configure_webhooks;
