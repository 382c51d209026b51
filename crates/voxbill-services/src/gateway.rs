//! Payment gateway collaborator client
//!
//! HTTP client for the payment processor's charge endpoint. Only the
//! contract is consumed here; credential storage and processor selection
//! live outside this core.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voxbill_core::{
    traits::{ChargeOutcome, PaymentGateway},
    AppError, AppResult,
};

/// HTTP implementation of the payment gateway collaborator
pub struct HttpPaymentGateway {
    http_client: Client,
    base_url: String,
    timeout_ms: u64,
}

/// Charge request body
#[derive(Debug, Serialize)]
struct ChargeRequest {
    user_id: Uuid,
    amount: Decimal,
}

/// Charge response body
#[derive(Debug, Deserialize)]
struct ChargeResponse {
    success: bool,
    provider_reference: Option<String>,
    reason: Option<String>,
}

impl HttpPaymentGateway {
    /// Create a new gateway client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Gateway base URL (e.g., "https://payments.internal")
    /// * `timeout_ms` - Request timeout in milliseconds
    pub fn new(base_url: &str, timeout_ms: u64) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::PaymentGateway(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn charge(&self, user_id: Uuid, amount: Decimal) -> AppResult<ChargeOutcome> {
        let url = format!("{}/charges", self.base_url);

        debug!("Requesting charge of {} for user {}", amount, user_id);

        let response = self
            .http_client
            .post(&url)
            .json(&ChargeRequest { user_id, amount })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::PaymentGatewayTimeout(self.timeout_ms)
                } else {
                    error!("Payment gateway request failed: {}", e);
                    AppError::PaymentGateway(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Payment gateway returned HTTP {}", status);
            return Err(AppError::PaymentGateway(format!(
                "Gateway returned HTTP {}",
                status
            )));
        }

        let body: ChargeResponse = response.json().await.map_err(|e| {
            error!("Failed to parse gateway response: {}", e);
            AppError::PaymentGateway(format!("Invalid response body: {}", e))
        })?;

        if body.success {
            let provider_reference = body.provider_reference.ok_or_else(|| {
                AppError::PaymentGateway("Approved charge without provider reference".to_string())
            })?;
            Ok(ChargeOutcome::Approved { provider_reference })
        } else {
            Ok(ChargeOutcome::Declined {
                reason: body
                    .reason
                    .unwrap_or_else(|| "declined without reason".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let gw = HttpPaymentGateway::new("https://payments.internal/", 5000).unwrap();
        assert_eq!(gw.base_url, "https://payments.internal");
    }

    #[test]
    fn test_charge_response_parsing() {
        let approved: ChargeResponse =
            serde_json::from_str(r#"{"success":true,"provider_reference":"ch_123"}"#).unwrap();
        assert!(approved.success);
        assert_eq!(approved.provider_reference.as_deref(), Some("ch_123"));

        let declined: ChargeResponse =
            serde_json::from_str(r#"{"success":false,"reason":"card_expired"}"#).unwrap();
        assert!(!declined.success);
        assert_eq!(declined.reason.as_deref(), Some("card_expired"));
    }
}
