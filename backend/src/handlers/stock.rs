//! HTTP handlers for carton and stock endpoints

use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    response::Response,
    Json,
};
use serde::Deserialize;
use shared::{validate_barcode, Pagination, PaginatedResponse, StockItem, StockLevel, StockThreshold};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::csv_attachment;
use crate::middleware::CurrentUser;
use crate::services::stock::{
    AdjustmentResult, CreateThresholdInput, GenerateLabelsInput, ItemFilter, RepackResult,
    StockItemDetail, StockService, StockSummary, SummaryFilter, UpdateThresholdInput,
};
use crate::AppState;

fn stock_service(state: &AppState) -> StockService {
    StockService::new(state.db.clone(), state.config.barcode.prefix.clone())
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScanRequest {
    #[validate(custom = "validate_barcode")]
    pub barcode: String,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PartialRepackRequest {
    #[validate(custom = "validate_barcode")]
    pub barcode: String,
    #[validate(range(min = 1, message = "Units taken must be at least 1"))]
    pub units_taken: i32,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustRequest {
    pub stock_item_id: Uuid,
    pub quantity_change: i32,
    #[validate(custom = "shared::validate_not_blank")]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct LevelsQuery {
    pub product_code: Option<String>,
    pub colour: Option<String>,
}

// ============================================================================
// Labels
// ============================================================================

/// Allocate barcodes and download the label sheet
pub async fn generate_labels(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<GenerateLabelsInput>,
) -> AppResult<Response> {
    current_user.0.require_warehouse("print labels")?;

    let batch = stock_service(&state).generate_labels(input).await?;

    let mut response = csv_attachment("labels.csv", batch.label_sheet);
    let headers = response.headers_mut();
    headers.insert("x-label-count", HeaderValue::from(batch.barcodes.len()));
    if let (Some(first), Some(last)) = (batch.barcodes.first(), batch.barcodes.last()) {
        headers.insert("x-first-barcode", HeaderValue::from_str(first).map_err(anyhow::Error::from)?);
        headers.insert("x-last-barcode", HeaderValue::from_str(last).map_err(anyhow::Error::from)?);
    }
    Ok(response)
}

/// Reprint the label for one carton
pub async fn reprint_label(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(barcode): Path<String>,
) -> AppResult<Response> {
    let sheet = stock_service(&state).single_label(&barcode).await?;
    Ok(csv_attachment(&format!("label-{}.csv", barcode), sheet))
}

// ============================================================================
// Carton lifecycle
// ============================================================================

/// Receive a labelled carton into stock
pub async fn scan_in(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ScanRequest>,
) -> AppResult<Json<StockItem>> {
    current_user.0.require_warehouse("scan cartons in")?;
    input.validate()?;

    let item = stock_service(&state)
        .scan_in(input.barcode.trim(), current_user.0.user_id)
        .await?;
    Ok(Json(item))
}

/// Dispatch a whole carton
pub async fn scan_out(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ScanRequest>,
) -> AppResult<Json<StockItem>> {
    current_user.0.require_warehouse("scan cartons out")?;
    input.validate()?;

    let item = stock_service(&state)
        .scan_out(input.barcode.trim(), current_user.0.user_id, input.order_id)
        .await?;
    Ok(Json(item))
}

/// Take units from a carton and relabel the remainder
pub async fn partial_repack(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<PartialRepackRequest>,
) -> AppResult<Json<RepackResult>> {
    current_user.0.require_warehouse("repack cartons")?;
    input.validate()?;

    let result = stock_service(&state)
        .partial_repack(
            input.barcode.trim(),
            input.units_taken,
            current_user.0.user_id,
            input.order_id,
        )
        .await?;
    Ok(Json(result))
}

/// Manual stock correction
pub async fn adjust(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustRequest>,
) -> AppResult<Json<AdjustmentResult>> {
    current_user.0.require_admin("adjust stock")?;
    input.validate()?;

    let result = stock_service(&state)
        .adjust(
            input.stock_item_id,
            input.quantity_change,
            input.reason,
            current_user.0.user_id,
        )
        .await?;
    Ok(Json(result))
}

// ============================================================================
// Queries
// ============================================================================

/// On-hand levels per product and colour
pub async fn stock_levels(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<LevelsQuery>,
) -> AppResult<Json<Vec<StockLevel>>> {
    let levels = stock_service(&state)
        .stock_levels(query.product_code, query.colour)
        .await?;
    Ok(Json(levels))
}

pub async fn stock_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<SummaryFilter>,
) -> AppResult<Json<StockSummary>> {
    let summary = stock_service(&state).stock_summary(filter).await?;
    Ok(Json(summary))
}

pub async fn list_items(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<ItemFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockItem>>> {
    let items = stock_service(&state).list_items(filter, &pagination).await?;
    Ok(Json(items))
}

/// Carton with its movement history
pub async fn get_item(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<StockItemDetail>> {
    let detail = stock_service(&state).item_detail(stock_item_id).await?;
    Ok(Json(detail))
}

// ============================================================================
// Thresholds
// ============================================================================

pub async fn list_thresholds(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<StockThreshold>>> {
    let thresholds = stock_service(&state).list_thresholds().await?;
    Ok(Json(thresholds))
}

pub async fn create_threshold(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateThresholdInput>,
) -> AppResult<Json<StockThreshold>> {
    current_user.0.require_admin("manage thresholds")?;
    let threshold = stock_service(&state).create_threshold(input).await?;
    Ok(Json(threshold))
}

pub async fn update_threshold(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(threshold_id): Path<Uuid>,
    Json(input): Json<UpdateThresholdInput>,
) -> AppResult<Json<StockThreshold>> {
    current_user.0.require_admin("manage thresholds")?;
    let threshold = stock_service(&state)
        .update_threshold(threshold_id, input)
        .await?;
    Ok(Json(threshold))
}

pub async fn delete_threshold(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(threshold_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    current_user.0.require_admin("manage thresholds")?;
    stock_service(&state).delete_threshold(threshold_id).await?;
    Ok(Json(()))
}
