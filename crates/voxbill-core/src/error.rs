//! Unified error handling for VoxBill
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the application, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Business Logic Errors ====================
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Rate not found for destination: {0}")]
    RateNotFound(String),

    #[error("Invalid call transition: {0}")]
    InvalidTransition(String),

    #[error("Duplicate ledger key: {0}")]
    DuplicateLedgerKey(String),

    #[error("Top-up already in flight for user: {0}")]
    TopupInFlight(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Payment gateway timed out after {0}ms")]
    PaymentGatewayTimeout(u64),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::UserNotFound(_)
            | AppError::CallNotFound(_)
            | AppError::RateNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::AlreadyExists(_)
            | AppError::DuplicateLedgerKey(_) => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::TopupInFlight(_) => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            AppError::PaymentGateway(_) | AppError::PaymentGatewayTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::RateNotFound(_) => "rate_not_found",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::DuplicateLedgerKey(_) => "duplicate_ledger_key",
            AppError::TopupInFlight(_) => "topup_in_flight",
            AppError::PaymentGateway(_) => "payment_gateway_error",
            AppError::PaymentGatewayTimeout(_) => "payment_gateway_timeout",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Check if the error is transient and worth retrying
    ///
    /// Used by the ledger manager to decide whether a failed write
    /// should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Transaction(_) | AppError::Pool(_) | AppError::Database(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::UserNotFound("123".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DuplicateLedgerKey("call:abc".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PaymentGatewayTimeout(5000).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::InvalidTransition("completed -> ringing".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::RateNotFound("51".to_string()).error_code(),
            "rate_not_found"
        );
        assert_eq!(
            AppError::TopupInFlight("u1".to_string()).error_code(),
            "topup_in_flight"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::Transaction("serialization failure".to_string()).is_retryable());
        assert!(!AppError::Validation("bad".to_string()).is_retryable());
    }
}
