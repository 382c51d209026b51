//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub billing: BillingConfig,
    pub gateway: GatewayConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Default TTL for cached rate entries in seconds
    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,
}

fn default_rate_cache_ttl() -> u64 {
    300
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Maximum attempts for a conflicting ledger write
    #[serde(default = "default_ledger_retries")]
    pub ledger_max_retries: u32,

    /// Base backoff between ledger retries in milliseconds
    #[serde(default = "default_ledger_backoff")]
    pub ledger_retry_backoff_ms: u64,

    /// TTL for the per-user top-up in-flight marker in seconds
    #[serde(default = "default_topup_marker_ttl")]
    pub topup_marker_ttl_secs: u64,
}

fn default_ledger_retries() -> u32 {
    3
}

fn default_ledger_backoff() -> u64 {
    50
}

fn default_topup_marker_ttl() -> u64 {
    30
}

/// Payment gateway collaborator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Base URL of the payment gateway charge endpoint
    pub url: String,

    /// Request timeout in milliseconds
    ///
    /// Bounds how long the top-up in-flight marker can be held.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_ms: u64,
}

fn default_gateway_timeout() -> u64 {
    10_000
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("redis.rate_cache_ttl_secs", 300)?
            .set_default("billing.ledger_max_retries", 3)?
            .set_default("billing.ledger_retry_backoff_ms", 50)?
            .set_default("billing.topup_marker_ttl_secs", 30)?
            .set_default("gateway.timeout_ms", 10_000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with VOXBILL_ prefix
            .add_source(
                Environment::with_prefix("VOXBILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("VOXBILL").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            ledger_max_retries: 3,
            ledger_retry_backoff_ms: 50,
            topup_marker_ttl_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.ledger_max_retries, 3);
        assert_eq!(config.topup_marker_ttl_secs, 30);
    }
}
