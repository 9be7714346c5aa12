//! HTTP handlers for purchase order endpoints

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use shared::{CompletionDecision, ExtractedOrder, Order, OrderLineItem, Pagination, PaginatedResponse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::csv_attachment;
use crate::middleware::CurrentUser;
use crate::services::order::{
    ApprovalOutcome, OrderDetail, OrderFilter, OrderService, OrderSummary, UpdateLineItemInput,
    UpdateOrderInput,
};
use crate::services::stock_verification::StockVerificationService;
use crate::AppState;

fn order_service(state: &AppState) -> OrderService {
    OrderService::new(state.db.clone(), state.documents.clone())
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// Create an order from an extraction result
pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(extracted): Json<ExtractedOrder>,
) -> AppResult<Json<Order>> {
    current_user.0.require_office("create orders")?;
    let order = order_service(&state)
        .create_from_extraction(None, &extracted)
        .await?;
    Ok(Json(order))
}

pub async fn list_orders(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<OrderFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<OrderSummary>>> {
    let orders = order_service(&state).list(filter, &pagination).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let detail = order_service(&state).detail(order_id).await?;
    Ok(Json(detail))
}

/// Edit a pending order's header
pub async fn update_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<UpdateOrderInput>,
) -> AppResult<Json<Order>> {
    current_user.0.require_office("edit orders")?;
    let order = order_service(&state).update(order_id, input).await?;
    Ok(Json(order))
}

/// Edit one line of a pending order
pub async fn update_line_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((order_id, line_item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateLineItemInput>,
) -> AppResult<Json<OrderLineItem>> {
    current_user.0.require_office("edit orders")?;
    let item = order_service(&state)
        .update_line_item(order_id, line_item_id, input)
        .await?;
    Ok(Json(item))
}

pub async fn approve_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApprovalOutcome>> {
    current_user.0.require_office("approve orders")?;
    let outcome = order_service(&state)
        .approve(order_id, current_user.0.user_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn reject_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RejectRequest>,
) -> AppResult<Json<Order>> {
    current_user.0.require_office("reject orders")?;
    let order = order_service(&state).reject(order_id, &input.reason).await?;
    Ok(Json(order))
}

/// Retry document generation for an order
pub async fn check_completion(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<CompletionDecision>> {
    current_user.0.require_office("generate documents")?;
    let decision = StockVerificationService::new(state.db.clone(), state.documents.clone())
        .check_completion(order_id)
        .await?;
    Ok(Json(decision))
}

// ============================================================================
// Documents
// ============================================================================

pub async fn download_office_order(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Response> {
    let (order, bytes) = order_service(&state).office_order(order_id).await?;
    let filename = format!(
        "office-order-{}.csv",
        order.po_number.as_deref().unwrap_or("N-A")
    );
    Ok(csv_attachment(&filename, bytes))
}

pub async fn download_works_order(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((order_id, line_item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    let (item, bytes) = order_service(&state)
        .works_order(order_id, line_item_id)
        .await?;
    Ok(csv_attachment(
        &format!("works-order-line-{}.csv", item.line_number),
        bytes,
    ))
}
