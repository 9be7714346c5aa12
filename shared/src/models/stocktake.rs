//! Stocktake sessions and scan classification

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::stock::CartonStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StocktakeStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl StocktakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StocktakeStatus::InProgress => "in_progress",
            StocktakeStatus::Completed => "completed",
            StocktakeStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(StocktakeStatus::InProgress),
            "completed" => Some(StocktakeStatus::Completed),
            "cancelled" => Some(StocktakeStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for StocktakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one stocktake scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ScanResult {
    Found,
    NotInSystem,
    AlreadyScanned,
    WrongStatus,
}

impl ScanResult {
    pub const ALL: [ScanResult; 4] = [
        ScanResult::Found,
        ScanResult::NotInSystem,
        ScanResult::AlreadyScanned,
        ScanResult::WrongStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::Found => "found",
            ScanResult::NotInSystem => "not_in_system",
            ScanResult::AlreadyScanned => "already_scanned",
            ScanResult::WrongStatus => "wrong_status",
        }
    }

    /// Counted as a discrepancy when the session completes
    pub fn is_unexpected(&self) -> bool {
        matches!(self, ScanResult::NotInSystem | ScanResult::WrongStatus)
    }

    /// Stored names of every unexpected result, for query filters
    pub fn unexpected_names() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|r| r.is_unexpected())
            .map(ScanResult::as_str)
            .collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StocktakeError {
    #[error("Session is not in progress (status: {0})")]
    NotInProgress(StocktakeStatus),

    #[error("Session name is required")]
    NameRequired,
}

/// Require a session to still accept scans, completion or cancellation
pub fn require_in_progress(status: StocktakeStatus) -> Result<(), StocktakeError> {
    match status {
        StocktakeStatus::InProgress => Ok(()),
        other => Err(StocktakeError::NotInProgress(other)),
    }
}

/// Classify a scanned barcode.
///
/// A repeat scan of the same barcode within the session is checked first,
/// whatever the carton looks like now.
pub fn classify_scan(already_scanned: bool, carton_status: Option<CartonStatus>) -> ScanResult {
    if already_scanned {
        return ScanResult::AlreadyScanned;
    }
    match carton_status {
        None => ScanResult::NotInSystem,
        Some(CartonStatus::InStock) => ScanResult::Found,
        Some(_) => ScanResult::WrongStatus,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StocktakeSession {
    pub id: Uuid,
    pub name: String,
    pub status: StocktakeStatus,
    pub started_by: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    /// In-stock carton count when the session started
    pub total_expected: i32,
    /// Distinct cartons found so far
    pub total_scanned: i32,
    pub total_discrepancies: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StocktakeSession {
    pub fn progress(&self) -> SessionProgress {
        SessionProgress::new(self.total_expected, self.total_scanned)
    }
}

/// Append-only record of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StocktakeScan {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Exactly what the scanner read; may match no carton
    pub barcode_scanned: String,
    pub stock_item_id: Option<Uuid>,
    pub scan_result: ScanResult,
    pub scanned_by: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub total_expected: i32,
    pub total_scanned: i32,
    pub percentage: f64,
}

impl SessionProgress {
    pub fn new(total_expected: i32, total_scanned: i32) -> Self {
        let percentage = if total_expected > 0 {
            let raw = f64::from(total_scanned) / f64::from(total_expected) * 100.0;
            (raw * 10.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            total_expected,
            total_scanned,
            percentage,
        }
    }
}

/// Barcodes of in-stock cartons that no `found` scan covered
pub fn missing_barcodes<'a>(
    in_stock: impl IntoIterator<Item = &'a str>,
    found: &HashSet<&str>,
) -> Vec<&'a str> {
    in_stock
        .into_iter()
        .filter(|barcode| !found.contains(barcode))
        .collect()
}

/// Missing cartons plus unexpected scans
pub fn total_discrepancies(missing: usize, unexpected: usize) -> i32 {
    i32::try_from(missing + unexpected).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_checked_first() {
        assert_eq!(classify_scan(true, Some(CartonStatus::InStock)), ScanResult::AlreadyScanned);
        assert_eq!(classify_scan(true, None), ScanResult::AlreadyScanned);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_scan(false, None), ScanResult::NotInSystem);
        assert_eq!(classify_scan(false, Some(CartonStatus::InStock)), ScanResult::Found);
        assert_eq!(classify_scan(false, Some(CartonStatus::Picked)), ScanResult::WrongStatus);
        assert_eq!(classify_scan(false, Some(CartonStatus::PendingScan)), ScanResult::WrongStatus);
    }

    #[test]
    fn test_unexpected_results() {
        assert!(ScanResult::NotInSystem.is_unexpected());
        assert!(ScanResult::WrongStatus.is_unexpected());
        assert!(!ScanResult::Found.is_unexpected());
        assert!(!ScanResult::AlreadyScanned.is_unexpected());
    }

    #[test]
    fn test_unexpected_names() {
        assert_eq!(ScanResult::unexpected_names(), vec!["not_in_system", "wrong_status"]);
    }

    #[test]
    fn test_progress() {
        assert_eq!(SessionProgress::new(3, 1).percentage, 33.3);
        assert_eq!(SessionProgress::new(10, 10).percentage, 100.0);
        assert_eq!(SessionProgress::new(0, 0).percentage, 0.0);
    }

    #[test]
    fn test_missing_barcodes() {
        let in_stock = ["A", "B", "C"];
        let found: HashSet<&str> = ["B"].into_iter().collect();
        assert_eq!(missing_barcodes(in_stock, &found), vec!["A", "C"]);
        assert_eq!(total_discrepancies(2, 1), 3);
    }

    #[test]
    fn test_require_in_progress() {
        assert!(require_in_progress(StocktakeStatus::InProgress).is_ok());
        let err = require_in_progress(StocktakeStatus::Completed).unwrap_err();
        assert_eq!(err.to_string(), "Session is not in progress (status: completed)");
    }
}
