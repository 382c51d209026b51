//! User model
//!
//! The balance field is owned exclusively by the ledger manager; every other
//! component reads it through the manager or this read-only model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity (prepaid caller)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,

    /// Registered phone number (used to resolve synthesized inbound calls)
    pub phone_number: String,

    /// Caller-identity country (origin context for rate scoping)
    pub country_code: Option<String>,

    /// Current prepaid balance; mutated only through the ledger manager
    pub balance: Decimal,

    /// Currency code (ISO 4217)
    pub currency: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check if the user has a negative balance
    ///
    /// Negative balance is a signal for collections/suspension flows, not an
    /// error; debits are always recorded as observed.
    #[inline]
    pub fn has_deficit(&self) -> bool {
        self.balance < Decimal::ZERO
    }

    /// Normalize a phone number for matching
    pub fn normalize_phone(phone: &str) -> String {
        phone.chars().filter(|c| c.is_ascii_digit()).collect()
    }
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: String::new(),
            country_code: None,
            balance: Decimal::ZERO,
            currency: "USD".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(User::normalize_phone("+1-555-123-4567"), "15551234567");
        assert_eq!(User::normalize_phone("(555) 123-4567"), "5551234567");
    }

    #[test]
    fn test_deficit() {
        let mut user = User::default();
        assert!(!user.has_deficit());
        user.balance = dec!(-0.10);
        assert!(user.has_deficit());
    }
}
