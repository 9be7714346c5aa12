//! HTTP handlers

pub mod health;
pub mod inbox;
pub mod orders;
pub mod products;
pub mod stock;
pub mod stocktake;
pub mod verification;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

pub use health::health_check;

/// CSV body served as a file download
pub(crate) fn csv_attachment(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        body,
    )
        .into_response()
}
