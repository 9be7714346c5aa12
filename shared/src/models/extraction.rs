//! Typed purchase-order extraction payloads
//!
//! The extraction service returns every field as a value plus a confidence
//! score. A missing value and a low-confidence value are different things
//! and both survive into the order as-is.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Line items whose average field confidence is below this need review
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// One extracted field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue<T> {
    #[serde(default = "Option::default")]
    pub value: Option<T>,
    #[serde(default)]
    pub confidence: f64,
}

impl<T> Default for FieldValue<T> {
    fn default() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }
}

impl<T> FieldValue<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self {
            value: Some(value),
            confidence,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Order header plus line items as returned by the extraction service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedOrder {
    #[serde(default)]
    pub customer_name: FieldValue<String>,
    #[serde(default)]
    pub po_number: FieldValue<String>,
    #[serde(default)]
    pub po_date: FieldValue<NaiveDate>,
    #[serde(default)]
    pub delivery_date: FieldValue<NaiveDate>,
    #[serde(default)]
    pub special_instructions: FieldValue<String>,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub line_items: Vec<ExtractedLineItem>,
}

/// One extracted line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    #[serde(default)]
    pub product_code: FieldValue<String>,
    #[serde(default)]
    pub description: FieldValue<String>,
    #[serde(default)]
    pub colour: FieldValue<String>,
    #[serde(default)]
    pub quantity: FieldValue<i32>,
    #[serde(default)]
    pub unit_price: FieldValue<Decimal>,
}

impl ExtractedLineItem {
    /// Mean confidence of product code, quantity and description
    pub fn average_confidence(&self) -> f64 {
        (self.product_code.confidence + self.quantity.confidence + self.description.confidence)
            / 3.0
    }

    /// Extracted code, trimmed; `None` when blank
    pub fn product_code(&self) -> Option<&str> {
        self.product_code
            .value
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Ordered quantity; absent or non-positive quantities become zero
    pub fn quantity(&self) -> i32 {
        self.quantity.value.unwrap_or(0).max(0)
    }

    /// A line needs review when its code was not matched to the catalog or
    /// when extraction was unsure about it.
    pub fn needs_review(&self, matched_product_code: Option<&str>) -> bool {
        matched_product_code.is_none()
            || self.quantity() == 0
            || self.average_confidence() < REVIEW_CONFIDENCE_THRESHOLD
    }
}

/// Confidence score stored on the order, rounded to two places
pub fn confidence_decimal(confidence: f64) -> Decimal {
    Decimal::try_from(confidence.clamp(0.0, 1.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}
