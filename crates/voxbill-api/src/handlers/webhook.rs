//! Telephony webhook handler
//!
//! The carrier retries any delivery that is not acknowledged with a success
//! code, so every outcome short of a hard pipeline failure returns 200.
//! Hard failures map through `AppError` to a 5xx, prompting a retry that is
//! safe because the pipeline is idempotent.

use crate::dto::{WebhookAck, WebhookPayload};
use crate::state::AppServices;
use actix_web::{
    web::{Data, Json, ServiceConfig},
    Result,
};
use tracing::{instrument, warn};
use validator::Validate;
use voxbill_core::AppError;

/// Ingest one carrier lifecycle notification
#[instrument(skip(services, payload))]
pub async fn ingest_webhook(
    payload: Json<WebhookPayload>,
    services: Data<AppServices>,
) -> Result<Json<WebhookAck>> {
    payload.validate().map_err(|e| {
        warn!("Invalid webhook payload: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let event = payload.into_inner().into_event()?;
    let ack = services.pipeline.process(event).await?;

    Ok(Json(WebhookAck::from(ack)))
}

/// Configure webhook routes
pub fn configure_webhooks(cfg: &mut ServiceConfig) {
    cfg.route(
        "/webhooks/telephony",
        actix_web::web::post().to(ingest_webhook),
    );
}
