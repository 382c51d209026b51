//! Repository implementations for VoxBill

pub mod call_repo;
pub mod idempotency_repo;
pub mod ledger_repo;
pub mod rate_repo;
pub mod topup_policy_repo;
pub mod user_repo;

pub use call_repo::PgCallRepository;
pub use idempotency_repo::PgIdempotencyStore;
pub use ledger_repo::PgLedgerRepository;
pub use rate_repo::PgRateRepository;
pub use topup_policy_repo::PgTopupPolicyRepository;
pub use user_repo::PgUserRepository;
