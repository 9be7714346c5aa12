//! HTTP handlers for stocktake endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::{validate_barcode, SessionProgress, StocktakeScan, StocktakeSession};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stocktake::{CompletionReport, DiscrepancyReport, ScanOutcome, StocktakeService};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(max = 255))]
    pub name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StocktakeScanRequest {
    #[validate(custom = "validate_barcode")]
    pub barcode: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    #[serde(default)]
    pub auto_adjust: bool,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<StocktakeSession>>> {
    let sessions = StocktakeService::new(state.db).list().await?;
    Ok(Json(sessions))
}

/// Open a new stocktake
pub async fn start_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<StartSessionRequest>,
) -> AppResult<Json<StocktakeSession>> {
    current_user.0.require_warehouse("start stocktakes")?;
    input.validate()?;

    let session = StocktakeService::new(state.db)
        .start(&input.name, input.notes, current_user.0.user_id)
        .await?;
    Ok(Json(session))
}

pub async fn get_session(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<StocktakeSession>> {
    let session = StocktakeService::new(state.db).get(session_id).await?;
    Ok(Json(session))
}

pub async fn scan(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(input): Json<StocktakeScanRequest>,
) -> AppResult<Json<ScanOutcome>> {
    current_user.0.require_warehouse("scan stocktakes")?;
    input.validate()?;

    let outcome = StocktakeService::new(state.db)
        .scan(session_id, input.barcode.trim(), input.notes, current_user.0.user_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn list_scans(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<Vec<StocktakeScan>>> {
    let scans = StocktakeService::new(state.db).scans(session_id).await?;
    Ok(Json(scans))
}

pub async fn progress(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<SessionProgress>> {
    let progress = StocktakeService::new(state.db).progress(session_id).await?;
    Ok(Json(progress))
}

/// Close a stocktake, optionally writing off missing cartons
pub async fn complete_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(input): Json<CompleteSessionRequest>,
) -> AppResult<Json<CompletionReport>> {
    current_user.0.require_warehouse("complete stocktakes")?;
    if input.auto_adjust {
        current_user.0.require_admin("write off missing cartons")?;
    }

    let report = StocktakeService::new(state.db)
        .complete(session_id, input.auto_adjust, current_user.0.user_id)
        .await?;
    Ok(Json(report))
}

pub async fn cancel_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<StocktakeSession>> {
    current_user.0.require_warehouse("cancel stocktakes")?;
    let session = StocktakeService::new(state.db)
        .cancel(session_id, current_user.0.user_id)
        .await?;
    Ok(Json(session))
}

pub async fn discrepancies(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<DiscrepancyReport>> {
    let report = StocktakeService::new(state.db)
        .discrepancies(session_id)
        .await?;
    Ok(Json(report))
}
