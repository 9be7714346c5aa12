//! HTTP handlers for the email inbox and its monitor

use axum::{
    extract::{Query, State},
    Json,
};
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inbox::{
    EmailFilter, InboxService, InboxStatus, IncomingEmail, IngestEmailInput, ProcessSummary,
};
use crate::AppState;

/// Store an email for extraction
pub async fn ingest_email(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<IngestEmailInput>,
) -> AppResult<Json<IncomingEmail>> {
    current_user.0.require_office("ingest emails")?;
    let email = InboxService::new(state.db).ingest(input).await?;
    Ok(Json(email))
}

pub async fn list_emails(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<EmailFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<IncomingEmail>>> {
    let emails = InboxService::new(state.db).list(filter, &pagination).await?;
    Ok(Json(emails))
}

pub async fn monitor_status(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> Json<InboxStatus> {
    Json(state.inbox.status().await)
}

pub async fn start_monitor(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<InboxStatus>> {
    current_user.0.require_admin("start the inbox monitor")?;
    state.inbox.start().await;
    Ok(Json(state.inbox.status().await))
}

pub async fn stop_monitor(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<InboxStatus>> {
    current_user.0.require_admin("stop the inbox monitor")?;
    state.inbox.stop().await;
    Ok(Json(state.inbox.status().await))
}

/// Process unprocessed emails now
pub async fn poll_now(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ProcessSummary>> {
    current_user.0.require_office("poll the inbox")?;
    let summary = state.inbox.poll_once().await?;
    Ok(Json(summary))
}
