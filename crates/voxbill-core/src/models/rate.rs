//! Rate entry model
//!
//! Represents the per-minute price for calling a destination, optionally
//! scoped by the caller-identity country. Cost computation lives here as a
//! pure function so it is trivially unit-testable and safe to call multiple
//! times without side effects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of seconds in one billing unit (whole minutes, rounded up)
const BILLING_UNIT_SECONDS: i32 = 60;

/// Rate entry entity
///
/// For a given `(destination_code, origin_context)` pair at most one `active`
/// entry is authoritative at query time. Entries with `origin_context = None`
/// are destination-wide fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEntry {
    /// Unique identifier
    pub id: i32,

    /// Destination code this rate applies to (e.g., "51" for Peru)
    pub destination_code: String,

    /// Caller-identity country scope; None matches any origin
    pub origin_context: Option<String>,

    /// Rate per whole minute
    pub per_minute_rate: Decimal,

    /// Currency code (ISO 4217)
    pub currency: String,

    /// Whether this entry is authoritative at query time
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl RateEntry {
    /// Calculate the cost of a call at this rate
    ///
    /// The billing unit is whole minutes rounded up: a 1-second call bills a
    /// full minute. Non-positive durations cost zero.
    #[inline]
    pub fn cost_for(&self, duration_seconds: i32) -> Decimal {
        Decimal::from(Self::billable_minutes(duration_seconds)) * self.per_minute_rate
    }

    /// Billable whole minutes for a duration
    #[inline]
    pub fn billable_minutes(duration_seconds: i32) -> i32 {
        if duration_seconds <= 0 {
            return 0;
        }
        (duration_seconds + BILLING_UNIT_SECONDS - 1) / BILLING_UNIT_SECONDS
    }

    /// Normalize a destination code for lookup
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

impl Default for RateEntry {
    fn default() -> Self {
        Self {
            id: 0,
            destination_code: String::new(),
            origin_context: None,
            per_minute_rate: Decimal::ZERO,
            currency: "USD".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rate(per_minute: Decimal) -> RateEntry {
        RateEntry {
            per_minute_rate: per_minute,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_second_bills_full_minute() {
        let r = rate(dec!(0.10));
        assert_eq!(r.cost_for(1), dec!(0.10));
        assert_eq!(r.cost_for(60), dec!(0.10));
        assert_eq!(r.cost_for(1), r.cost_for(60));
    }

    #[test]
    fn test_sixty_one_seconds_bills_two_minutes() {
        let r = rate(dec!(0.10));
        assert_eq!(r.cost_for(61), dec!(0.20));
        assert_eq!(r.cost_for(61), r.cost_for(60) * dec!(2));
        assert_eq!(r.cost_for(120), dec!(0.20));
        assert_eq!(r.cost_for(121), dec!(0.30));
    }

    #[test]
    fn test_forty_five_seconds_at_ten_cents() {
        // 45s at $0.10/min -> ceil(45/60) = 1 minute -> $0.10
        let r = rate(dec!(0.10));
        assert_eq!(r.cost_for(45), dec!(0.10));
    }

    #[test]
    fn test_zero_and_negative_durations_are_free() {
        let r = rate(dec!(0.25));
        assert_eq!(r.cost_for(0), Decimal::ZERO);
        assert_eq!(r.cost_for(-5), Decimal::ZERO);
    }

    #[test]
    fn test_rounding_law_holds_for_odd_rates() {
        let r = rate(dec!(0.07));
        assert_eq!(r.cost_for(1), r.cost_for(60));
        assert_eq!(r.cost_for(61), r.cost_for(60) * dec!(2));
    }

    #[test]
    fn test_billable_minutes() {
        assert_eq!(RateEntry::billable_minutes(0), 0);
        assert_eq!(RateEntry::billable_minutes(1), 1);
        assert_eq!(RateEntry::billable_minutes(60), 1);
        assert_eq!(RateEntry::billable_minutes(61), 2);
        assert_eq!(RateEntry::billable_minutes(3600), 60);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(RateEntry::normalize_code(" pe "), "PE");
        assert_eq!(RateEntry::normalize_code("51"), "51");
    }
}
