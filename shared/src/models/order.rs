//! Purchase order models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    /// Approved and every stock check resolved; documents are being written
    Verified,
    WorksOrderGenerated,
    Rejected,
    /// Upstream extraction failed
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Verified => "verified",
            OrderStatus::WorksOrderGenerated => "works_order_generated",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "approved" => Some(OrderStatus::Approved),
            "verified" => Some(OrderStatus::Verified),
            "works_order_generated" => Some(OrderStatus::WorksOrderGenerated),
            "rejected" => Some(OrderStatus::Rejected),
            "error" => Some(OrderStatus::Error),
            _ => None,
        }
    }

    /// Whether moving to `next` follows the order state machine
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Error)
                | (Approved, Verified)
                | (Approved, Error)
                | (Verified, WorksOrderGenerated)
        )
    }

    /// Works orders may only be produced from these statuses
    pub fn allows_generation(&self) -> bool {
        matches!(self, OrderStatus::Approved | OrderStatus::Verified)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order state violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order is '{current}', must be '{required}'")]
    WrongStatus {
        current: OrderStatus,
        required: OrderStatus,
    },

    #[error("Order cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order has no line items")]
    NoLineItems,

    #[error("Rejection reason is required")]
    RejectionReasonRequired,
}

/// Require an order to be pending before it is edited, approved or rejected
pub fn require_pending(status: OrderStatus) -> Result<(), OrderError> {
    if status == OrderStatus::Pending {
        Ok(())
    } else {
        Err(OrderError::WrongStatus {
            current: status,
            required: OrderStatus::Pending,
        })
    }
}

/// Check a status change against the order state machine and return the
/// status to write
pub fn transition(current: OrderStatus, next: OrderStatus) -> Result<OrderStatus, OrderError> {
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(OrderError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}

/// One purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: Uuid,
    pub email_id: Option<Uuid>,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub po_number: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub special_instructions: Option<String>,
    pub extraction_confidence: Option<Decimal>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_reason: Option<String>,
    /// Set once the stock verification pass has run for this order
    pub stock_checked_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub office_order_file: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn has_office_order(&self) -> bool {
        self.office_order_file.is_some()
    }

    /// Work-order number printed on the document for a line
    pub fn works_order_number(&self, line_number: i32) -> String {
        format!(
            "WO-{}-{}",
            self.po_number.as_deref().unwrap_or("N/A"),
            line_number
        )
    }
}

/// One ordered product/colour/quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    /// 1-based, unique within the order
    pub line_number: i32,
    /// Code as written on the purchase order
    pub product_code: Option<String>,
    /// Catalog match, if any
    pub matched_product_code: Option<String>,
    pub product_description: Option<String>,
    pub colour: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub confidence: Option<Decimal>,
    pub needs_review: bool,
    #[serde(skip)]
    pub works_order_file: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderLineItem {
    /// Product/colour to look up on-hand stock for; the catalog match wins
    /// over the raw extracted code.
    pub fn stock_key(&self) -> Option<(&str, &str)> {
        let product = self
            .matched_product_code
            .as_deref()
            .or(self.product_code.as_deref())
            .filter(|p| !p.trim().is_empty())?;
        let colour = self.colour.as_deref().filter(|c| !c.trim().is_empty())?;
        Some((product, colour))
    }

    pub fn has_works_order(&self) -> bool {
        self.works_order_file.is_some()
    }
}

/// `quantity × unit_price` rounded to cents
pub fn line_total(quantity: i32, unit_price: Option<Decimal>) -> Option<Decimal> {
    unit_price.map(|price| (price * Decimal::from(quantity)).round_dp(2))
}
