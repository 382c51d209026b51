//! Service wiring for the HTTP layer
//!
//! Builds the concrete service graph once at startup; handlers receive the
//! shared instances through actix `Data`.

use std::sync::Arc;
use voxbill_cache::RedisCache;
use voxbill_core::AppConfig;
use voxbill_core::AppResult;
use voxbill_db::{
    PgCallRepository, PgIdempotencyStore, PgLedgerRepository, PgRateRepository,
    PgTopupPolicyRepository, PgUserRepository,
};
use voxbill_services::{
    HttpPaymentGateway, IngestService, LedgerManager, RatingService, TopupTrigger,
};

/// The fully wired ingestion pipeline
pub type BillingPipeline = IngestService<
    PgCallRepository,
    PgUserRepository,
    RatingService<PgRateRepository, RedisCache>,
    PgLedgerRepository,
    PgIdempotencyStore,
    TopupTrigger<PgLedgerRepository, PgTopupPolicyRepository, HttpPaymentGateway, RedisCache>,
>;

/// Shared service handles for the HTTP layer
pub struct AppServices {
    pub pipeline: Arc<BillingPipeline>,
    pub ledger: Arc<LedgerManager<PgLedgerRepository>>,
}

/// Wire repositories and services from the pool, cache, and configuration
pub fn build_services(
    pool: sqlx::PgPool,
    cache: RedisCache,
    config: &AppConfig,
) -> AppResult<AppServices> {
    let cache = Arc::new(cache);

    let calls = Arc::new(PgCallRepository::new(pool.clone()));
    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let guard = Arc::new(PgIdempotencyStore::new(pool.clone()));

    let rate_repo = Arc::new(PgRateRepository::new(pool.clone()));
    let resolver = Arc::new(RatingService::new(
        rate_repo,
        cache.clone(),
        config.redis.rate_cache_ttl_secs,
    ));

    let ledger_repo = Arc::new(PgLedgerRepository::new(pool.clone()));
    let ledger = Arc::new(LedgerManager::with_retries(
        ledger_repo,
        config.billing.ledger_max_retries,
        config.billing.ledger_retry_backoff_ms,
    ));

    let policies = Arc::new(PgTopupPolicyRepository::new(pool));
    let gateway = Arc::new(HttpPaymentGateway::new(
        &config.gateway.url,
        config.gateway.timeout_ms,
    )?);
    let topup = Arc::new(TopupTrigger::new(
        ledger.clone(),
        policies,
        gateway,
        cache,
        config.billing.topup_marker_ttl_secs,
        config.gateway.timeout_ms,
    ));

    let pipeline = Arc::new(IngestService::new(
        calls,
        users,
        resolver,
        ledger.clone(),
        guard,
        topup,
    ));

    Ok(AppServices { pipeline, ledger })
}
