//! Cache key constants and builders for VoxBill
//!
//! Provides standardized key naming patterns for all cached entities,
//! ensuring consistency across the application and preventing key collisions.
//!
//! # Key Patterns
//!
//! - `rate:{destination}:{origin}` - Cached rate entries by lookup pair
//! - `topup_inflight:{user_id}` - Per-user top-up exclusivity marker

/// Prefix for cached rate entries
///
/// Format: `rate:{destination}:{origin}` (origin defaults to `any`)
pub const RATE_KEY_PREFIX: &str = "rate";

/// Prefix for the top-up in-flight marker
///
/// Format: `topup_inflight:{user_id}`
pub const TOPUP_INFLIGHT_PREFIX: &str = "topup_inflight";

/// Default TTL for cached rate entries (5 minutes)
pub const RATE_TTL_SECS: u64 = 300;

/// Default TTL for the top-up in-flight marker (30 seconds)
///
/// Must exceed the payment gateway timeout so the marker outlives any
/// in-flight request, and expire soon after so a crashed trigger self-heals.
pub const TOPUP_INFLIGHT_TTL_SECS: u64 = 30;

/// Build a cache key for a rate lookup pair
pub fn rate_key(destination_code: &str, origin_context: Option<&str>) -> String {
    format!(
        "{}:{}:{}",
        RATE_KEY_PREFIX,
        destination_code,
        origin_context.unwrap_or("any")
    )
}

/// Build the top-up in-flight marker key for a user
pub fn topup_inflight_key(user_id: &str) -> String {
    format!("{}:{}", TOPUP_INFLIGHT_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_key() {
        assert_eq!(rate_key("51", Some("US")), "rate:51:US");
        assert_eq!(rate_key("51", None), "rate:51:any");
    }

    #[test]
    fn test_topup_inflight_key() {
        assert_eq!(topup_inflight_key("u-1"), "topup_inflight:u-1");
    }
}
