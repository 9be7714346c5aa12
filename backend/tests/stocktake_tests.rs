//! Stocktake reconciliation tests
//!
//! Tests for session scanning and completion including:
//! - Property 8: Discrepancy Accounting
//! - Progress percentage
//! - Ten-carton session scenario

use std::collections::HashSet;

use proptest::prelude::*;
use shared::{
    classify_scan, missing_barcodes, plan_write_off, require_in_progress, total_discrepancies,
    AdjustmentOrigin, CartonStatus, ScanResult, SessionProgress, StocktakeStatus,
};
use uuid::Uuid;

fn barcodes(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("RJ-TUB-WHT-20260201-{:03}", i)).collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Ten expected, eight found, one unknown barcode; auto-adjust writes
    /// off the two missing cartons.
    #[test]
    fn test_ten_carton_session_scenario() {
        let expected = barcodes(10);
        let quantity = 25;

        let mut found: HashSet<&str> = HashSet::new();
        let mut scanned = 0;
        for barcode in expected.iter().take(8) {
            let result = classify_scan(found.contains(barcode.as_str()), Some(CartonStatus::InStock));
            assert_eq!(result, ScanResult::Found);
            found.insert(barcode.as_str());
            scanned += 1;
        }

        let stray = classify_scan(false, None);
        assert_eq!(stray, ScanResult::NotInSystem);
        assert!(stray.is_unexpected());
        let unexpected = 1;

        let progress = SessionProgress::new(10, scanned);
        assert_eq!(progress.percentage, 80.0);

        let missing = missing_barcodes(expected.iter().map(String::as_str), &found);
        assert_eq!(missing.len(), 2);

        let origin = AdjustmentOrigin::Stocktake {
            session_id: Uuid::new_v4(),
            session_name: "February count".to_string(),
        };
        for _ in &missing {
            let plan = plan_write_off(CartonStatus::InStock, quantity, &origin).unwrap();
            assert_eq!(plan.new_status, CartonStatus::Scrapped);
            assert_eq!(plan.quantity_change, -quantity);
        }

        assert_eq!(total_discrepancies(missing.len(), unexpected), 3);
    }

    #[test]
    fn test_repeat_scan_is_flagged() {
        assert_eq!(classify_scan(true, Some(CartonStatus::InStock)), ScanResult::AlreadyScanned);
        assert!(!ScanResult::AlreadyScanned.is_unexpected());
    }

    #[test]
    fn test_wrong_status_is_unexpected() {
        let result = classify_scan(false, Some(CartonStatus::Picked));
        assert_eq!(result, ScanResult::WrongStatus);
        assert!(result.is_unexpected());
    }

    #[test]
    fn test_closed_sessions_reject_changes() {
        assert!(require_in_progress(StocktakeStatus::InProgress).is_ok());
        assert!(require_in_progress(StocktakeStatus::Completed).is_err());
        assert!(require_in_progress(StocktakeStatus::Cancelled).is_err());
    }

    #[test]
    fn test_progress_with_nothing_expected() {
        let progress = SessionProgress::new(0, 3);
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn test_progress_rounds_to_one_place() {
        assert_eq!(SessionProgress::new(3, 1).percentage, 33.3);
        assert_eq!(SessionProgress::new(3, 2).percentage, 66.7);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 8: Discrepancy Accounting
        /// missing = expected - found, and discrepancies = missing + unexpected
        #[test]
        fn prop_missing_is_complement_of_found(
            expected_count in 0usize..60,
            found_mask in prop::collection::vec(prop::bool::ANY, 60),
            unexpected in 0usize..10
        ) {
            let expected = barcodes(expected_count);
            let found: HashSet<&str> = expected
                .iter()
                .zip(found_mask.iter())
                .filter(|(_, hit)| **hit)
                .map(|(b, _)| b.as_str())
                .collect();

            let missing = missing_barcodes(expected.iter().map(String::as_str), &found);

            prop_assert_eq!(missing.len() + found.len(), expected.len());
            prop_assert!(missing.iter().all(|b| !found.contains(b)));
            prop_assert_eq!(
                total_discrepancies(missing.len(), unexpected),
                (missing.len() + unexpected) as i32
            );
        }

        /// Progress stays within 0..=100 while scans do not exceed expectations
        #[test]
        fn prop_progress_bounds(expected in 1i32..10_000, scanned_fraction in 0.0f64..=1.0) {
            let scanned = (f64::from(expected) * scanned_fraction) as i32;
            let progress = SessionProgress::new(expected, scanned);

            prop_assert!(progress.percentage >= 0.0);
            prop_assert!(progress.percentage <= 100.0);
        }

        /// Only in-stock cartons not yet scanned count as found
        #[test]
        fn prop_classification(already in prop::bool::ANY, in_stock in prop::bool::ANY) {
            let status = if in_stock { CartonStatus::InStock } else { CartonStatus::Scrapped };
            let result = classify_scan(already, Some(status));
            prop_assert_eq!(result == ScanResult::Found, !already && in_stock);
        }
    }
}
