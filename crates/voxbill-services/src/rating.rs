//! Rate resolution service
//!
//! Resolves the authoritative rate for a destination with Redis caching.
//! Lookup order: exact (destination, origin) match, then destination-only
//! fallback, then None. A missing rate is NOT treated as free; the caller is
//! responsible for flagging the call for audit.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use voxbill_cache::keys;
use voxbill_core::{
    models::RateEntry,
    traits::{CacheService, RateRepository, RateResolver},
    AppResult,
};

/// Rate resolver implementation with caching
///
/// Cache errors degrade to database reads; a flaky cache must never fail a
/// billing pipeline.
pub struct RatingService<R: RateRepository, C: CacheService> {
    rate_repo: Arc<R>,
    cache: Arc<C>,
    cache_ttl_secs: u64,
}

impl<R: RateRepository, C: CacheService> RatingService<R, C> {
    /// Create a new rating service
    pub fn new(rate_repo: Arc<R>, cache: Arc<C>, cache_ttl_secs: u64) -> Self {
        Self {
            rate_repo,
            cache,
            cache_ttl_secs,
        }
    }

    /// Try to get a rate from cache
    async fn get_from_cache(&self, key: &str) -> Option<RateEntry> {
        match self.cache.get::<RateEntry>(key).await {
            Ok(rate) => {
                if rate.is_some() {
                    debug!("Rate cache HIT for {}", key);
                }
                rate
            }
            Err(e) => {
                warn!("Cache error for {}: {}", key, e);
                None
            }
        }
    }

    /// Store a rate in cache
    async fn store_in_cache(&self, key: &str, rate: &RateEntry) {
        if let Err(e) = self.cache.set(key, rate, self.cache_ttl_secs).await {
            warn!("Failed to cache rate for {}: {}", key, e);
        }
    }
}

#[async_trait]
impl<R: RateRepository, C: CacheService> RateResolver for RatingService<R, C> {
    #[instrument(skip(self))]
    async fn resolve(
        &self,
        destination_code: &str,
        origin_context: Option<&str>,
    ) -> AppResult<Option<RateEntry>> {
        let normalized = RateEntry::normalize_code(destination_code);

        if normalized.is_empty() {
            warn!("Empty destination code after normalization");
            return Ok(None);
        }

        let origin = origin_context.map(RateEntry::normalize_code);
        let key = keys::rate_key(&normalized, origin.as_deref());

        if let Some(rate) = self.get_from_cache(&key).await {
            return Ok(Some(rate));
        }

        debug!("Rate cache MISS for {}", key);

        let rate = match origin.as_deref() {
            Some(o) => match self.rate_repo.find_exact(&normalized, o).await? {
                Some(rate) => Some(rate),
                None => self.rate_repo.find_fallback(&normalized).await?,
            },
            None => self.rate_repo.find_fallback(&normalized).await?,
        };

        if let Some(ref r) = rate {
            self.store_in_cache(&key, r).await;
        }

        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde::{de::DeserializeOwned, Serialize};
    use voxbill_core::AppError;

    struct MockRateRepository {
        exact: Option<RateEntry>,
        fallback: Option<RateEntry>,
    }

    #[async_trait]
    impl RateRepository for MockRateRepository {
        async fn find_exact(
            &self,
            _destination_code: &str,
            _origin_context: &str,
        ) -> AppResult<Option<RateEntry>> {
            Ok(self.exact.clone())
        }

        async fn find_fallback(&self, _destination_code: &str) -> AppResult<Option<RateEntry>> {
            Ok(self.fallback.clone())
        }
    }

    /// Cache that never hits and never stores
    struct NullCache;

    #[async_trait]
    impl CacheService for NullCache {
        async fn get<T: DeserializeOwned>(&self, _key: &str) -> Result<Option<T>, AppError> {
            Ok(None)
        }

        async fn set<T: Serialize + Send + Sync>(
            &self,
            _key: &str,
            _value: &T,
            _ttl_secs: u64,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn set_nx(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn delete(&self, _key: &str) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn exists(&self, _key: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    fn rate(code: &str, origin: Option<&str>, per_minute: rust_decimal::Decimal) -> RateEntry {
        RateEntry {
            destination_code: code.to_string(),
            origin_context: origin.map(str::to_string),
            per_minute_rate: per_minute,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_exact_match_wins_over_fallback() {
        let repo = Arc::new(MockRateRepository {
            exact: Some(rate("51", Some("US"), dec!(0.10))),
            fallback: Some(rate("51", None, dec!(0.25))),
        });
        let service = RatingService::new(repo, Arc::new(NullCache), 60);

        let resolved = service.resolve("51", Some("US")).await.unwrap().unwrap();
        assert_eq!(resolved.per_minute_rate, dec!(0.10));
    }

    #[tokio::test]
    async fn test_falls_back_to_destination_only() {
        let repo = Arc::new(MockRateRepository {
            exact: None,
            fallback: Some(rate("51", None, dec!(0.25))),
        });
        let service = RatingService::new(repo, Arc::new(NullCache), 60);

        let resolved = service.resolve("51", Some("US")).await.unwrap().unwrap();
        assert_eq!(resolved.per_minute_rate, dec!(0.25));
    }

    #[tokio::test]
    async fn test_not_found_is_none_not_error() {
        let repo = Arc::new(MockRateRepository {
            exact: None,
            fallback: None,
        });
        let service = RatingService::new(repo, Arc::new(NullCache), 60);

        assert!(service.resolve("999", Some("US")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_destination_resolves_to_none() {
        let repo = Arc::new(MockRateRepository {
            exact: Some(rate("51", None, dec!(0.10))),
            fallback: None,
        });
        let service = RatingService::new(repo, Arc::new(NullCache), 60);

        assert!(service.resolve("  ", None).await.unwrap().is_none());
    }
}
