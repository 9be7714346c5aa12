//! HTTP handlers for stock verification endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock_verification::{
    OrderVerifications, PendingOrderGroup, StockVerificationService, VerificationOutcome,
};
use crate::AppState;

fn verification_service(state: &AppState) -> StockVerificationService {
    StockVerificationService::new(state.db.clone(), state.documents.clone())
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmRequest {
    #[validate(range(min = 0, message = "Verified quantity cannot be negative"))]
    pub verified_quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpireRequest {
    pub notes: Option<String>,
}

/// Pending verifications grouped by order
pub async fn list_pending(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<PendingOrderGroup>>> {
    let groups = verification_service(&state).pending_by_order().await?;
    Ok(Json(groups))
}

pub async fn order_verifications(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderVerifications>> {
    let verifications = verification_service(&state).for_order(order_id).await?;
    Ok(Json(verifications))
}

/// Record a warehouse count against a verification
pub async fn confirm_verification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(verification_id): Path<Uuid>,
    Json(input): Json<ConfirmRequest>,
) -> AppResult<Json<VerificationOutcome>> {
    current_user.0.require_warehouse("confirm stock verifications")?;
    input.validate()?;

    let outcome = verification_service(&state)
        .confirm(
            verification_id,
            input.verified_quantity,
            input.notes,
            current_user.0.user_id,
        )
        .await?;
    Ok(Json(outcome))
}

/// Give up on a verification so the line is produced in full
pub async fn expire_verification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(verification_id): Path<Uuid>,
    Json(input): Json<ExpireRequest>,
) -> AppResult<Json<VerificationOutcome>> {
    current_user.0.require_admin("expire stock verifications")?;

    let outcome = verification_service(&state)
        .expire(verification_id, input.notes, current_user.0.user_id)
        .await?;
    Ok(Json(outcome))
}
