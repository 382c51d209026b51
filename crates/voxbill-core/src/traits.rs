//! Common traits for repositories and services
//!
//! Defines abstractions for database access, caching, and the external
//! payment gateway collaborator. Every component receives its dependencies
//! explicitly through these traits so they are visible in constructors and
//! mockable in tests.

use crate::error::AppError;
use crate::models::{
    Admission, AppliedTransaction, AutoTopupPolicy, Call, LedgerEntry, LedgerReason, RateEntry,
    User,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Call repository trait
///
/// Calls are never deleted; there is intentionally no delete operation.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Find a call by the carrier-assigned session id
    async fn find_by_external_id(&self, external_call_id: &str) -> Result<Option<Call>, AppError>;

    /// Persist a new call record (including synthesized ones)
    async fn insert(&self, call: &Call) -> Result<Call, AppError>;

    /// Persist the mutated state of an existing call
    async fn update(&self, call: &Call) -> Result<Call, AppError>;
}

/// Rate repository trait
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Find the active entry for an exact (destination, origin) pair
    async fn find_exact(
        &self,
        destination_code: &str,
        origin_context: &str,
    ) -> Result<Option<RateEntry>, AppError>;

    /// Find the active destination-wide fallback entry (no origin scope)
    async fn find_fallback(&self, destination_code: &str) -> Result<Option<RateEntry>, AppError>;
}

/// Ledger repository trait
///
/// The only abstraction permitted to mutate a user's balance. `apply` must
/// execute as a single atomic unit: read balance under a row lock, append
/// the immutable ledger row, persist the new balance.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomically apply a signed delta and append the ledger row
    ///
    /// A duplicate `idempotency_key` returns the already-recorded outcome
    /// with `duplicate = true` instead of applying the delta again.
    async fn apply(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: LedgerReason,
        idempotency_key: &str,
        related_call_id: Option<Uuid>,
    ) -> Result<AppliedTransaction, AppError>;

    /// Current balance for a user
    async fn balance_of(&self, user_id: Uuid) -> Result<Decimal, AppError>;

    /// Paginated, newest-first statement for a user with total count
    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerEntry>, i64), AppError>;
}

/// Idempotency store trait
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically admit an event key
    ///
    /// The check and the record insert are a single operation; two concurrent
    /// deliveries of the same key admit exactly one.
    async fn admit(&self, event_key: &str) -> Result<Admission, AppError>;

    /// Record the disposition once the pipeline has committed
    async fn complete(&self, event_key: &str, outcome_summary: &str) -> Result<(), AppError>;

    /// Forget an admitted key after a hard pipeline failure so the carrier's
    /// retry re-runs the event
    async fn release(&self, event_key: &str) -> Result<(), AppError>;
}

/// Auto top-up policy repository trait (read-only for the trigger)
#[async_trait]
pub trait TopupPolicyRepository: Send + Sync {
    /// Policy for a user, if configured
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<AutoTopupPolicy>, AppError>;
}

/// User repository trait (read-only within this core)
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Find user by registered phone number
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError>;
}

/// Rate resolver service trait
#[async_trait]
pub trait RateResolver: Send + Sync {
    /// Resolve the authoritative rate for a destination
    ///
    /// Lookup order: exact (destination, origin) match, then destination-only
    /// fallback, then None. None is not "free": the caller must flag the call
    /// for audit.
    async fn resolve(
        &self,
        destination_code: &str,
        origin_context: Option<&str>,
    ) -> Result<Option<RateEntry>, AppError>;
}

/// Outcome of a payment gateway charge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The gateway accepted the charge
    Approved {
        /// Gateway-assigned reference, reused as the top-up idempotency key
        provider_reference: String,
    },
    /// The gateway refused the charge
    Declined { reason: String },
}

/// Payment gateway collaborator trait
///
/// Only the contract is consumed here; credential storage and the concrete
/// processor live outside this core.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge a user's payment method for a top-up
    async fn charge(&self, user_id: Uuid, amount: Decimal) -> Result<ChargeOutcome, AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Set a marker only if absent, with TTL; returns whether it was set
    ///
    /// The atomic check-then-act primitive behind the top-up in-flight
    /// exclusivity guarantee.
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 10);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
    }

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(0, 10);
        assert_eq!(p.page, 1);

        let p = Pagination::new(1, 2000);
        assert_eq!(p.per_page, 1000);
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(95, 1, 10);
        assert_eq!(meta.total_pages, 10);

        let meta = PaginationMeta::new(101, 1, 10);
        assert_eq!(meta.total_pages, 11);
    }
}
