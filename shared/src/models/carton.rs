//! Carton lifecycle transitions
//!
//! ```text
//! pending_scan --scan_in--> in_stock --scan_out--> picked
//! in_stock --partial_repack--> consumed (+ new in_stock partial carton)
//! in_stock --adjustment to 0--> scrapped
//! in_stock --adjustment, stays > 0--> in_stock
//! ```
//!
//! Every guard here runs before any row is touched, so a rejected operation
//! never leaves a half-applied carton behind.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use super::stock::CartonStatus;

/// Violated carton precondition, each with an operator-facing message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartonError {
    #[error("Already scanned in")]
    AlreadyScannedIn,

    #[error("Cannot scan in: item has been {0}")]
    CannotScanIn(CartonStatus),

    #[error("Item not yet scanned in")]
    NotYetScannedIn,

    #[error("Already scanned out")]
    AlreadyScannedOut,

    #[error("Cannot scan out: item has been {0}")]
    CannotScanOut(CartonStatus),

    #[error("Cannot repack: item status is '{0}'")]
    CannotRepack(CartonStatus),

    #[error("Units taken must be greater than zero")]
    UnitsTakenNotPositive,

    #[error("Units taken ({taken}) must be less than box quantity ({quantity}). Use scan-out for the whole box.")]
    UnitsTakenNotLessThanQuantity { taken: i32, quantity: i32 },

    #[error("Cannot adjust: item status is '{0}'")]
    CannotAdjust(CartonStatus),

    #[error("Adjustment would result in negative quantity (current: {current}, change: {change})")]
    NegativeQuantity { current: i32, change: i32 },

    #[error("A reason is required for stock adjustments")]
    ReasonRequired,
}

/// Check that a carton may be scanned in
pub fn check_scan_in(status: CartonStatus) -> Result<(), CartonError> {
    match status {
        CartonStatus::PendingScan => Ok(()),
        CartonStatus::InStock => Err(CartonError::AlreadyScannedIn),
        CartonStatus::Picked | CartonStatus::Scrapped | CartonStatus::Consumed => {
            Err(CartonError::CannotScanIn(status))
        }
    }
}

/// Check that a carton may be scanned out
pub fn check_scan_out(status: CartonStatus) -> Result<(), CartonError> {
    match status {
        CartonStatus::InStock => Ok(()),
        CartonStatus::PendingScan => Err(CartonError::NotYetScannedIn),
        CartonStatus::Picked => Err(CartonError::AlreadyScannedOut),
        CartonStatus::Scrapped | CartonStatus::Consumed => Err(CartonError::CannotScanOut(status)),
    }
}

/// Quantities resulting from a partial repack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackPlan {
    /// Quantity written off the original carton (its full quantity)
    pub original_quantity: i32,
    pub units_taken: i32,
    /// Quantity of the new partial carton
    pub remaining: i32,
}

impl RepackPlan {
    /// Net change across both movements; always `-units_taken`
    pub fn net_change(&self) -> i32 {
        -self.original_quantity + self.remaining
    }
}

/// Validate a partial repack and compute the remainder.
///
/// Taking the whole carton is rejected; that is a plain scan-out.
pub fn plan_partial_repack(
    status: CartonStatus,
    quantity: i32,
    units_taken: i32,
) -> Result<RepackPlan, CartonError> {
    if status != CartonStatus::InStock {
        return Err(CartonError::CannotRepack(status));
    }
    if units_taken <= 0 {
        return Err(CartonError::UnitsTakenNotPositive);
    }
    if units_taken >= quantity {
        return Err(CartonError::UnitsTakenNotLessThanQuantity {
            taken: units_taken,
            quantity,
        });
    }

    Ok(RepackPlan {
        original_quantity: quantity,
        units_taken,
        remaining: quantity - units_taken,
    })
}

/// Dates stamped on the carton a repack creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackDates {
    /// Date segment of the new barcode: the day it was relabelled
    pub barcode_date: NaiveDate,
    /// Carried over from the parent carton
    pub production_date: NaiveDate,
}

pub fn repack_dates(parent_production_date: NaiveDate, today: NaiveDate) -> RepackDates {
    RepackDates {
        barcode_date: today,
        production_date: parent_production_date,
    }
}

/// Who is asking for a quantity change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOrigin {
    /// Operator-entered adjustment; the reason is mandatory
    Manual { reason: String },
    /// Write-off of a carton a stocktake session did not find
    Stocktake { session_id: Uuid, session_name: String },
}

impl AdjustmentOrigin {
    /// Reason recorded on the movement row
    pub fn reason(&self) -> String {
        match self {
            AdjustmentOrigin::Manual { reason } => reason.trim().to_string(),
            AdjustmentOrigin::Stocktake { session_name, .. } => {
                format!("Stocktake discrepancy: item not found during {}", session_name)
            }
        }
    }

    pub fn stocktake_session_id(&self) -> Option<Uuid> {
        match self {
            AdjustmentOrigin::Manual { .. } => None,
            AdjustmentOrigin::Stocktake { session_id, .. } => Some(*session_id),
        }
    }
}

/// Outcome of a quantity adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentPlan {
    pub quantity_change: i32,
    pub new_quantity: i32,
    pub new_status: CartonStatus,
}

/// Single precondition check shared by manual adjustments and stocktake
/// write-offs.
pub fn plan_adjustment(
    status: CartonStatus,
    quantity: i32,
    quantity_change: i32,
    origin: &AdjustmentOrigin,
) -> Result<AdjustmentPlan, CartonError> {
    if let AdjustmentOrigin::Manual { reason } = origin {
        if reason.trim().is_empty() {
            return Err(CartonError::ReasonRequired);
        }
    }
    if status != CartonStatus::InStock {
        return Err(CartonError::CannotAdjust(status));
    }

    let new_quantity = quantity
        .checked_add(quantity_change)
        .filter(|q| *q >= 0)
        .ok_or(CartonError::NegativeQuantity {
            current: quantity,
            change: quantity_change,
        })?;

    let new_status = if new_quantity == 0 {
        CartonStatus::Scrapped
    } else {
        CartonStatus::InStock
    };

    Ok(AdjustmentPlan {
        quantity_change,
        new_quantity,
        new_status,
    })
}

/// Full write-off of a carton, as used by stocktake reconciliation
pub fn plan_write_off(
    status: CartonStatus,
    quantity: i32,
    origin: &AdjustmentOrigin,
) -> Result<AdjustmentPlan, CartonError> {
    plan_adjustment(status, quantity, -quantity, origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(reason: &str) -> AdjustmentOrigin {
        AdjustmentOrigin::Manual {
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_scan_in_messages() {
        assert_eq!(check_scan_in(CartonStatus::PendingScan), Ok(()));
        assert_eq!(
            check_scan_in(CartonStatus::InStock),
            Err(CartonError::AlreadyScannedIn)
        );
        let err = check_scan_in(CartonStatus::Picked).unwrap_err();
        assert_eq!(err.to_string(), "Cannot scan in: item has been picked");
    }

    #[test]
    fn test_scan_out_messages() {
        assert_eq!(check_scan_out(CartonStatus::InStock), Ok(()));
        assert_eq!(
            check_scan_out(CartonStatus::PendingScan),
            Err(CartonError::NotYetScannedIn)
        );
        assert_eq!(
            check_scan_out(CartonStatus::Picked),
            Err(CartonError::AlreadyScannedOut)
        );
        let err = check_scan_out(CartonStatus::Consumed).unwrap_err();
        assert_eq!(err.to_string(), "Cannot scan out: item has been consumed");
    }

    #[test]
    fn test_repack_rejects_whole_carton() {
        let err = plan_partial_repack(CartonStatus::InStock, 50, 50).unwrap_err();
        assert_eq!(
            err,
            CartonError::UnitsTakenNotLessThanQuantity {
                taken: 50,
                quantity: 50
            }
        );
        assert!(err.to_string().contains("Use scan-out"));
    }

    #[test]
    fn test_repack_plan() {
        let plan = plan_partial_repack(CartonStatus::InStock, 50, 20).unwrap();
        assert_eq!(plan.remaining, 30);
        assert_eq!(plan.net_change(), -20);
    }

    #[test]
    fn test_repack_rejects_zero_and_wrong_status() {
        assert_eq!(
            plan_partial_repack(CartonStatus::InStock, 50, 0),
            Err(CartonError::UnitsTakenNotPositive)
        );
        assert_eq!(
            plan_partial_repack(CartonStatus::PendingScan, 50, 10),
            Err(CartonError::CannotRepack(CartonStatus::PendingScan))
        );
    }

    #[test]
    fn test_adjustment_to_zero_scraps() {
        let plan = plan_adjustment(CartonStatus::InStock, 12, -12, &manual("crushed")).unwrap();
        assert_eq!(plan.new_quantity, 0);
        assert_eq!(plan.new_status, CartonStatus::Scrapped);
    }

    #[test]
    fn test_adjustment_keeps_in_stock() {
        let plan = plan_adjustment(CartonStatus::InStock, 12, 3, &manual("recount")).unwrap();
        assert_eq!(plan.new_quantity, 15);
        assert_eq!(plan.new_status, CartonStatus::InStock);
    }

    #[test]
    fn test_adjustment_rejects_negative() {
        assert_eq!(
            plan_adjustment(CartonStatus::InStock, 5, -6, &manual("damaged")),
            Err(CartonError::NegativeQuantity {
                current: 5,
                change: -6
            })
        );
    }

    #[test]
    fn test_adjustment_requires_reason() {
        assert_eq!(
            plan_adjustment(CartonStatus::InStock, 5, -1, &manual("   ")),
            Err(CartonError::ReasonRequired)
        );
    }

    #[test]
    fn test_write_off_from_stocktake() {
        let origin = AdjustmentOrigin::Stocktake {
            session_id: Uuid::new_v4(),
            session_name: "March count".to_string(),
        };
        let plan = plan_write_off(CartonStatus::InStock, 40, &origin).unwrap();
        assert_eq!(plan.quantity_change, -40);
        assert_eq!(plan.new_status, CartonStatus::Scrapped);
        assert!(origin.reason().contains("March count"));
        assert!(origin.stocktake_session_id().is_some());
    }

    #[test]
    fn test_write_off_requires_in_stock() {
        let origin = AdjustmentOrigin::Stocktake {
            session_id: Uuid::new_v4(),
            session_name: "March count".to_string(),
        };
        assert_eq!(
            plan_write_off(CartonStatus::Picked, 40, &origin),
            Err(CartonError::CannotAdjust(CartonStatus::Picked))
        );
    }
}
