//! Purchase-order extraction client
//!
//! Sends an ingested email to the extraction service and gets back a typed
//! order with per-field confidence scores.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::ExtractedOrder;

use crate::config::ExtractionConfig;
use crate::error::{AppError, AppResult};

/// Client for the extraction service
#[derive(Clone)]
pub struct ExtractionClient {
    api_endpoint: String,
    api_key: String,
    http_client: Client,
}

/// Email content sent for extraction
#[derive(Debug, Serialize)]
pub struct ExtractionRequest {
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body_text: String,
}

/// Extraction service envelope
#[derive(Debug, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub order: Option<ExtractedOrder>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExtractionResponse {
    /// Extracted order, or the service-reported failure
    pub fn into_result(self) -> AppResult<ExtractedOrder> {
        match (self.order, self.error) {
            (_, Some(error)) => Err(AppError::Extraction(error)),
            (Some(order), None) => Ok(order),
            (None, None) => Err(AppError::Extraction("Empty extraction response".to_string())),
        }
    }
}

impl ExtractionClient {
    pub fn new(api_endpoint: String, api_key: String, timeout: Duration) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Extraction(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_endpoint,
            api_key,
            http_client,
        })
    }

    /// Build a client from configuration; `None` when no endpoint is set
    pub fn from_config(config: &ExtractionConfig) -> AppResult<Option<Self>> {
        if config.endpoint.trim().is_empty() {
            return Ok(None);
        }
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    /// Extract a purchase order from one email
    pub async fn extract(&self, request: &ExtractionRequest) -> AppResult<ExtractedOrder> {
        let response = self
            .http_client
            .post(&self.api_endpoint)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Extraction(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Extraction(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let result: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Extraction(format!("Failed to parse response: {}", e)))?;

        result.into_result()
    }
}
