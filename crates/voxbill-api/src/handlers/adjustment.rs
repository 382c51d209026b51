//! Admin adjustment handler
//!
//! Manual credits/debits (reason ADMIN or REFUND) from the admin UI
//! collaborator. They run through the same ledger manager as call debits,
//! so they carry the same exactly-once and atomicity guarantees.

use crate::dto::{AdjustmentRequest, AdjustmentResponse};
use crate::state::AppServices;
use actix_web::{
    web::{Data, Json, Path, ServiceConfig},
    Result,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use voxbill_core::{models::LedgerReason, AppError};

/// Apply a manual balance adjustment
#[instrument(skip(services, payload))]
pub async fn create_adjustment(
    path: Path<Uuid>,
    payload: Json<AdjustmentRequest>,
    services: Data<AppServices>,
) -> Result<Json<AdjustmentResponse>> {
    payload.validate().map_err(|e| {
        warn!("Invalid adjustment payload: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let user_id = path.into_inner();

    let reason = LedgerReason::from_str(&payload.reason)
        .filter(|r| matches!(r, LedgerReason::Admin | LedgerReason::Refund))
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Adjustment reason must be admin or refund, got: {}",
                payload.reason
            ))
        })?;

    let applied = services
        .ledger
        .apply_transaction(
            user_id,
            payload.amount,
            reason,
            &payload.idempotency_key,
            None,
        )
        .await?;

    info!(
        "Adjustment {} of {} for user {} (duplicate: {})",
        payload.idempotency_key, payload.amount, user_id, applied.duplicate
    );

    Ok(Json(AdjustmentResponse {
        entry_id: applied.entry.id,
        new_balance: applied.new_balance,
        duplicate: applied.duplicate,
    }))
}

/// Configure adjustment routes
pub fn configure_adjustments(cfg: &mut ServiceConfig) {
    cfg.route(
        "/users/{id}/adjustments",
        actix_web::web::post().to(create_adjustment),
    );
}
