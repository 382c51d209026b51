//! Redis caching layer for VoxBill
//!
//! Provides a caching implementation using Redis with connection pooling.
//! Implements the `CacheService` trait from voxbill-core for rate caching
//! and the top-up in-flight exclusivity marker.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Automatic serialization/deserialization using serde_json
//! - TTL support for cache entries
//! - Atomic SET NX EX for exclusive-check-then-act markers
//! - Comprehensive error handling with conversion to AppError

pub mod keys;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use voxbill_core::error::AppError;
use voxbill_core::traits::CacheService;

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let mut conn = self.manager.clone();

        let raw: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", key, e);
            AppError::Cache(format!("GET failed: {}", e))
        })?;

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    warn!("Failed to deserialize cached value for {}: {}", key, e);
                    AppError::Serialization(e.to_string())
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        let mut conn = self.manager.clone();

        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Serialization(e.to_string()))?;

        conn.set_ex::<_, _, ()>(key, json, ttl_secs)
            .await
            .map_err(|e| {
                warn!("Redis SET failed for {}: {}", key, e);
                AppError::Cache(format!("SET failed: {}", e))
            })?;

        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();

        // SET key value NX EX ttl is a single atomic operation; two
        // concurrent callers acquire exactly one marker.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis SET NX failed for {}: {}", key, e);
                AppError::Cache(format!("SET NX failed: {}", e))
            })?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();

        let removed: i64 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL failed for {}: {}", key, e);
            AppError::Cache(format!("DEL failed: {}", e))
        })?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(|e| {
            warn!("Redis EXISTS failed for {}: {}", key, e);
            AppError::Cache(format!("EXISTS failed: {}", e))
        })?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercising RedisCache needs a live server; covered by the ignored
    // round-trip below. Key building is tested in keys.rs.

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_set_get_roundtrip() {
        let cache = RedisCache::new("redis://127.0.0.1:6379").await.unwrap();

        cache.set("voxbill_test_key", &"value", 5).await.unwrap();
        let got: Option<String> = cache.get("voxbill_test_key").await.unwrap();
        assert_eq!(got, Some("value".to_string()));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_set_nx_is_exclusive() {
        let cache = RedisCache::new("redis://127.0.0.1:6379").await.unwrap();

        let key = "voxbill_test_nx";
        cache.delete(key).await.unwrap();
        assert!(cache.set_nx(key, "a", 5).await.unwrap());
        assert!(!cache.set_nx(key, "b", 5).await.unwrap());
    }
}
