//! Ledger statement handlers
//!
//! Read endpoints for the dashboard/reporting collaborators: a paginated
//! statement that reconstructs a user's history without re-deriving it from
//! calls, and a current balance snapshot.

use crate::dto::{BalanceResponse, LedgerEntryResponse, PaginationParams};
use crate::state::AppServices;
use actix_web::{
    web::{Data, Json, Path, Query, ServiceConfig},
    Result,
};
use tracing::instrument;
use uuid::Uuid;
use voxbill_core::traits::{PaginatedResponse, Pagination, PaginationMeta};

/// Paginated, newest-first statement for a user
#[instrument(skip(services))]
pub async fn get_statement(
    path: Path<Uuid>,
    query: Query<PaginationParams>,
    services: Data<AppServices>,
) -> Result<Json<PaginatedResponse<LedgerEntryResponse>>> {
    let user_id = path.into_inner();
    let pagination = Pagination::new(query.page, query.per_page);

    let (entries, total) = services
        .ledger
        .statement(user_id, pagination.limit(), pagination.offset())
        .await?;

    Ok(Json(PaginatedResponse {
        data: entries.into_iter().map(Into::into).collect(),
        pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
    }))
}

/// Current balance snapshot for a user
#[instrument(skip(services))]
pub async fn get_balance(
    path: Path<Uuid>,
    services: Data<AppServices>,
) -> Result<Json<BalanceResponse>> {
    let user_id = path.into_inner();
    let balance = services.ledger.balance_of(user_id).await?;

    Ok(Json(BalanceResponse { user_id, balance }))
}

/// Configure ledger routes
pub fn configure_ledger(cfg: &mut ServiceConfig) {
    cfg.route(
        "/users/{id}/ledger",
        actix_web::web::get().to(get_statement),
    )
    .route("/users/{id}/balance", actix_web::web::get().to(get_balance));
}
