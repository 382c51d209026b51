//! Webhook DTOs for the telephony carrier contract

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use voxbill_core::{
    models::{CallState, TopupOutcome},
    AppError,
};
use voxbill_services::{Acknowledgement, CallStatusEvent};

/// Inbound lifecycle notification payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebhookPayload {
    /// Carrier-assigned call session id
    #[validate(length(min = 1, max = 128))]
    pub call_id: String,

    /// Lifecycle status (one of the fixed enumeration)
    #[validate(length(min = 1, max = 32))]
    pub status: String,

    /// Elapsed duration in seconds
    #[validate(range(min = 0))]
    #[serde(default)]
    pub duration_seconds: i32,

    /// Caller number
    #[validate(length(min = 1, max = 32))]
    pub origin_number: String,

    /// Called number
    #[validate(length(min = 1, max = 32))]
    pub destination_number: String,

    /// Destination country/rate code
    pub destination_country: Option<String>,

    /// Parent call session id for nested legs
    pub parent_call_id: Option<String>,
}

impl WebhookPayload {
    /// Convert into the orchestrator's event type
    ///
    /// An unrecognized status is a client error, not an unknown-call
    /// recovery case.
    pub fn into_event(self) -> Result<CallStatusEvent, AppError> {
        let status = CallState::from_str(&self.status)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown status: {}", self.status)))?;

        Ok(CallStatusEvent {
            external_call_id: self.call_id,
            status,
            duration_seconds: self.duration_seconds,
            origin_number: self.origin_number,
            destination_number: self.destination_number,
            destination_country: self.destination_country,
            parent_call_id: self.parent_call_id,
        })
    }
}

/// Acknowledgment body returned to the carrier
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    /// Disposition: applied, duplicate, or ignored
    pub result: &'static str,

    /// Internal call id, when the event was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,

    /// Resulting call state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Final cost, when the call finalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,

    /// Top-up disposition, when a check ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topup: Option<String>,

    /// Rejection detail for ignored events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<Acknowledgement> for WebhookAck {
    fn from(ack: Acknowledgement) -> Self {
        match ack {
            Acknowledgement::Applied {
                call_id,
                state,
                cost,
                topup,
            } => Self {
                result: "applied",
                call_id: Some(call_id),
                state: Some(state.to_string()),
                cost,
                topup: topup.map(|t| match t {
                    TopupOutcome::Triggered(amount) => format!("triggered:{}", amount),
                    TopupOutcome::NotNeeded => "not_needed".to_string(),
                    TopupOutcome::AlreadyInFlight => "already_in_flight".to_string(),
                    TopupOutcome::Failed(reason) => format!("failed:{}", reason),
                }),
                detail: None,
            },
            Acknowledgement::Duplicate => Self {
                result: "duplicate",
                call_id: None,
                state: None,
                cost: None,
                topup: None,
                detail: None,
            },
            Acknowledgement::RejectedNoOp { reason } => Self {
                result: "ignored",
                call_id: None,
                state: None,
                cost: None,
                topup: None,
                detail: Some(reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(status: &str) -> WebhookPayload {
        WebhookPayload {
            call_id: "ext-1".to_string(),
            status: status.to_string(),
            duration_seconds: 45,
            origin_number: "15551234567".to_string(),
            destination_number: "51999888777".to_string(),
            destination_country: Some("51".to_string()),
            parent_call_id: None,
        }
    }

    #[test]
    fn test_into_event_parses_status() {
        let event = payload("COMPLETED").into_event().unwrap();
        assert_eq!(event.status, CallState::Completed);
        assert_eq!(event.duration_seconds, 45);
    }

    #[test]
    fn test_into_event_rejects_unknown_status() {
        let err = payload("teleported").into_event().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_validation_rejects_empty_call_id() {
        let mut p = payload("completed");
        p.call_id = String::new();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_duration() {
        let mut p = payload("completed");
        p.duration_seconds = -1;
        assert!(p.validate().is_err());
    }
}
