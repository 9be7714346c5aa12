//! Carton, movement and threshold models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a physical carton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CartonStatus {
    /// Label printed, carton not yet on the shelf
    PendingScan,
    InStock,
    /// Scanned out against an order
    Picked,
    Scrapped,
    /// Split by a partial repack; lives on through its child carton
    Consumed,
}

impl CartonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartonStatus::PendingScan => "pending_scan",
            CartonStatus::InStock => "in_stock",
            CartonStatus::Picked => "picked",
            CartonStatus::Scrapped => "scrapped",
            CartonStatus::Consumed => "consumed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_scan" => Some(CartonStatus::PendingScan),
            "in_stock" => Some(CartonStatus::InStock),
            "picked" => Some(CartonStatus::Picked),
            "scrapped" => Some(CartonStatus::Scrapped),
            "consumed" => Some(CartonStatus::Consumed),
            _ => None,
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CartonStatus::Picked | CartonStatus::Scrapped | CartonStatus::Consumed
        )
    }
}

impl std::fmt::Display for CartonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Box type printed on the label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BoxType {
    #[default]
    Full,
    Partial,
}

impl BoxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxType::Full => "full",
            BoxType::Partial => "partial",
        }
    }

    /// Text printed at the bottom of the label
    pub fn label_text(&self) -> &'static str {
        match self {
            BoxType::Full => "FULL BOX",
            BoxType::Partial => "PARTIAL BOX",
        }
    }
}

/// Kind of audit entry written for a carton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    StockIn,
    StockOut,
    Adjustment,
    PartialRepack,
    /// Zero-delta marker written when a stocktake finds the carton
    StocktakeVerified,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "stock_in",
            MovementType::StockOut => "stock_out",
            MovementType::Adjustment => "adjustment",
            MovementType::PartialRepack => "partial_repack",
            MovementType::StocktakeVerified => "stocktake_verified",
        }
    }
}

/// One physical carton (or partial carton) of product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockItem {
    pub id: Uuid,
    /// Printed on the label; never reused
    pub barcode_id: String,
    pub product_code: String,
    pub colour: String,
    pub quantity: i32,
    pub box_type: BoxType,
    pub status: CartonStatus,
    pub production_date: NaiveDate,
    pub scanned_in_at: Option<DateTime<Utc>>,
    pub scanned_in_by: Option<Uuid>,
    pub scanned_out_at: Option<DateTime<Utc>>,
    pub scanned_out_by: Option<Uuid>,
    pub order_id: Option<Uuid>,
    /// Carton this one was repacked from
    pub parent_stock_item_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry for a carton quantity change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub movement_type: MovementType,
    /// Signed change applied to the carton
    pub quantity_change: i32,
    pub reason: Option<String>,
    pub order_id: Option<Uuid>,
    pub stocktake_session_id: Option<Uuid>,
    pub performed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// On-hand stock for one product/colour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub product_code: String,
    pub colour: String,
    pub carton_count: i64,
    pub total_quantity: i64,
}

/// Red/amber reorder boundaries for a product, optionally per colour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockThreshold {
    pub id: Uuid,
    pub product_code: String,
    /// `None` applies to every colour of the product
    pub colour: Option<String>,
    pub red_threshold: Option<i32>,
    pub amber_threshold: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Colour-coded stock level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdStatus {
    Red,
    Amber,
    Green,
}

impl ThresholdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdStatus::Red => "red",
            ThresholdStatus::Amber => "amber",
            ThresholdStatus::Green => "green",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "red" => Some(ThresholdStatus::Red),
            "amber" => Some(ThresholdStatus::Amber),
            "green" => Some(ThresholdStatus::Green),
            _ => None,
        }
    }

    /// Red and amber both count as low stock
    pub fn is_low(&self) -> bool {
        !matches!(self, ThresholdStatus::Green)
    }
}

/// Classify a quantity against red/amber boundaries.
///
/// Returns `None` when neither boundary is configured. An unset boundary
/// counts as zero when the other one is set.
pub fn threshold_status(quantity: i64, red: Option<i32>, amber: Option<i32>) -> Option<ThresholdStatus> {
    if red.is_none() && amber.is_none() {
        return None;
    }
    let red = i64::from(red.unwrap_or(0));
    let amber = i64::from(amber.unwrap_or(0));

    if quantity >= amber {
        Some(ThresholdStatus::Green)
    } else if quantity >= red {
        Some(ThresholdStatus::Amber)
    } else {
        Some(ThresholdStatus::Red)
    }
}

/// Find the threshold for a product/colour: the exact row first, then the
/// product-wide row with no colour.
pub fn resolve_threshold<'a>(
    thresholds: &'a [StockThreshold],
    product_code: &str,
    colour: &str,
) -> Option<&'a StockThreshold> {
    thresholds
        .iter()
        .find(|t| t.product_code == product_code && t.colour.as_deref() == Some(colour))
        .or_else(|| {
            thresholds
                .iter()
                .find(|t| t.product_code == product_code && t.colour.is_none())
        })
}
