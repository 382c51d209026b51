//! Domain models for VoxBill
//!
//! This module contains all the core domain models used throughout the application.

pub mod call;
pub mod idempotency;
pub mod ledger;
pub mod rate;
pub mod topup;
pub mod user;

pub use call::{Call, CallState, Transition};
pub use idempotency::{event_key, Admission};
pub use ledger::{AppliedTransaction, LedgerEntry, LedgerReason};
pub use rate::RateEntry;
pub use topup::{AutoTopupPolicy, TopupOutcome};
pub use user::User;
