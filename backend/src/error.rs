//! Error handling for the plastics back office
//!
//! Every domain rejection carries the operator-facing message from the
//! shared crate; the HTTP status says which kind of rejection it was.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{CartonError, OrderError, StocktakeError, VerificationError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Unknown barcode, order, verification or session
    #[error("{0} not recognised")]
    NotFound(String),

    // Domain precondition violations
    #[error(transparent)]
    Carton(#[from] CartonError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Stocktake(#[from] StocktakeError),

    #[error(transparent)]
    Order(#[from] OrderError),

    // External collaborators
    #[error("Document generation failed: {0}")]
    DocumentGeneration(String),

    #[error("Extraction service error: {0}")]
    Extraction(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl AppError {
    /// Status code and body for this error
    fn parts(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorDetail::new("UNAUTHORIZED", msg.clone()))
            }
            AppError::InsufficientPermissions(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("INSUFFICIENT_PERMISSIONS", msg.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::InvalidInput(errors) => {
                let (field, message) = first_field_error(errors);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorDetail {
                        code: "VALIDATION_ERROR".to_string(),
                        message,
                        field,
                    },
                )
            }
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "DUPLICATE_ENTRY".to_string(),
                    message: format!("A record with this {} already exists", field),
                    field: Some(field.clone()),
                },
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorDetail::new("NOT_FOUND", self.to_string())),
            AppError::Carton(err) => {
                let status = match err {
                    CartonError::UnitsTakenNotPositive
                    | CartonError::UnitsTakenNotLessThanQuantity { .. }
                    | CartonError::NegativeQuantity { .. }
                    | CartonError::ReasonRequired => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::CONFLICT,
                };
                (status, ErrorDetail::new("CARTON_STATE", err.to_string()))
            }
            AppError::Verification(err) => {
                let status = match err {
                    VerificationError::NegativeQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::CONFLICT,
                };
                (status, ErrorDetail::new("VERIFICATION_STATE", err.to_string()))
            }
            AppError::Stocktake(err) => {
                let status = match err {
                    StocktakeError::NameRequired => StatusCode::UNPROCESSABLE_ENTITY,
                    StocktakeError::NotInProgress(_) => StatusCode::CONFLICT,
                };
                (status, ErrorDetail::new("STOCKTAKE_STATE", err.to_string()))
            }
            AppError::Order(err) => {
                let status = match err {
                    OrderError::WrongStatus { .. } | OrderError::InvalidTransition { .. } => {
                        StatusCode::CONFLICT
                    }
                    OrderError::NoLineItems | OrderError::RejectionReasonRequired => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (status, ErrorDetail::new("ORDER_STATE", err.to_string()))
            }
            AppError::DocumentGeneration(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("DOCUMENT_GENERATION_ERROR", format!("Document generation failed: {}", msg)),
            ),
            AppError::Extraction(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("EXTRACTION_ERROR", format!("Extraction service error: {}", msg)),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

/// First failing field of a validator result, for the response body
fn first_field_error(errors: &validator::ValidationErrors) -> (Option<String>, String) {
    errors
        .field_errors()
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (Some(field.to_string()), message)
            })
        })
        .unwrap_or_else(|| (None, "Invalid request".to_string()))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.parts();

        if status.is_server_error() {
            tracing::error!(code = %error_detail.code, "Error: {:?}", self);
        } else {
            tracing::warn!(code = %error_detail.code, "Rejected: {}", error_detail.message);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

/// Map a unique-constraint violation to `DuplicateEntry`, anything else to
/// a database error.
pub fn map_unique_violation(err: sqlx::Error, field: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateEntry(field.to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}
