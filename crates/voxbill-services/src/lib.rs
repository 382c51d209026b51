//! Business logic services for VoxBill
//!
//! This crate contains the services that orchestrate billing reconciliation:
//! webhook ingestion, rate resolution, ledger management, and auto top-up
//! triggering.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service receives its dependencies explicitly (repositories, cache,
//!   gateway) through the traits in voxbill-core
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `RatingService` - Rate resolution with caching (exact pair, then
//!   destination-only fallback)
//! - `LedgerManager` - The only component permitted to mutate balances;
//!   bounded retry around the atomic ledger write
//! - `TopupTrigger` - Post-transaction auto top-up with per-user exclusivity
//! - `HttpPaymentGateway` - Payment gateway collaborator client
//! - `IngestService` - The webhook ingestion orchestrator

pub mod gateway;
pub mod ingest;
pub mod ledger;
pub mod rating;
pub mod topup;

pub use gateway::HttpPaymentGateway;
pub use ingest::{Acknowledgement, CallStatusEvent, IngestService};
pub use ledger::LedgerManager;
pub use rating::RatingService;
pub use topup::{TopupCheck, TopupTrigger};

/// Business logic constants
pub mod constants {
    /// Idempotency key prefix for call debits
    ///
    /// One debit per call, ever: the key is derived from the carrier session
    /// id, so a re-finalization attempt collides with the recorded debit.
    pub const CALL_DEBIT_KEY_PREFIX: &str = "call";

    /// Idempotency key prefix for top-up credits
    pub const TOPUP_CREDIT_KEY_PREFIX: &str = "topup";

    /// Default maximum attempts for a conflicting ledger write
    pub const LEDGER_MAX_RETRIES: u32 = 3;

    /// Default base backoff between ledger retries in milliseconds
    pub const LEDGER_RETRY_BACKOFF_MS: u64 = 50;

    /// Build the ledger idempotency key for a call debit
    pub fn call_debit_key(external_call_id: &str) -> String {
        format!("{}:{}", CALL_DEBIT_KEY_PREFIX, external_call_id)
    }

    /// Build the ledger idempotency key for a top-up credit
    ///
    /// Derived from the gateway's provider reference so a re-submitted
    /// gateway response cannot credit twice.
    pub fn topup_credit_key(provider_reference: &str) -> String {
        format!("{}:{}", TOPUP_CREDIT_KEY_PREFIX, provider_reference)
    }
}
