//! Carton lifecycle tests
//!
//! Tests for carton transitions and quantity changes including:
//! - Property 2: Carton Conservation
//! - Property 3: Monotonic Status
//! - Property 4: Adjustment Floor
//! - Partial repack scenario

use chrono::NaiveDate;
use proptest::prelude::*;
use shared::{
    barcode_prefix, check_scan_in, check_scan_out, plan_adjustment, plan_partial_repack,
    plan_write_off, repack_dates, sequence_barcodes, AdjustmentOrigin, CartonError, CartonStatus,
};
use uuid::Uuid;

fn manual(reason: &str) -> AdjustmentOrigin {
    AdjustmentOrigin::Manual {
        reason: reason.to_string(),
    }
}

/// One operator action against a carton
#[derive(Debug, Clone)]
enum CartonOp {
    ScanIn,
    ScanOut,
    Repack(i32),
    Adjust(i32),
}

/// Apply an action; returns the carton's new status and quantity or the
/// precondition that blocked it.
fn apply(status: CartonStatus, quantity: i32, op: &CartonOp) -> Result<(CartonStatus, i32), CartonError> {
    match op {
        CartonOp::ScanIn => check_scan_in(status).map(|_| (CartonStatus::InStock, quantity)),
        CartonOp::ScanOut => check_scan_out(status).map(|_| (CartonStatus::Picked, quantity)),
        CartonOp::Repack(taken) => {
            plan_partial_repack(status, quantity, *taken).map(|_| (CartonStatus::Consumed, quantity))
        }
        CartonOp::Adjust(change) => plan_adjustment(status, quantity, *change, &manual("Recount"))
            .map(|plan| (plan.new_status, plan.new_quantity)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Scan in, then partial repack taking 20 of 50
    #[test]
    fn test_partial_repack_scenario() {
        let status = CartonStatus::PendingScan;
        check_scan_in(status).unwrap();
        let status = CartonStatus::InStock;

        let plan = plan_partial_repack(status, 50, 20).unwrap();
        assert_eq!(plan.original_quantity, 50);
        assert_eq!(plan.remaining, 30);

        // original carton leaves at full quantity, the new one comes in with the rest
        let movements = [-plan.original_quantity, plan.remaining];
        assert_eq!(movements.iter().sum::<i32>(), -20);
        assert_eq!(plan.net_change(), -20);
    }

    /// A carton made on 1 January and repacked on 15 October gets an
    /// October barcode but keeps its January production date
    #[test]
    fn test_repack_barcode_uses_repack_day() {
        let produced = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();

        let dates = repack_dates(produced, today);
        assert_eq!(dates.production_date, produced);

        let prefix = barcode_prefix("RJ", "DEF", "Black", dates.barcode_date);
        let barcodes = sequence_barcodes(&prefix, 0, 1);
        assert_eq!(barcodes, vec!["RJ-DEF-BLK-20261015-001".to_string()]);
    }

    #[test]
    fn test_repack_whole_carton_rejected() {
        let err = plan_partial_repack(CartonStatus::InStock, 50, 50).unwrap_err();
        assert_eq!(
            err,
            CartonError::UnitsTakenNotLessThanQuantity {
                taken: 50,
                quantity: 50
            }
        );
    }

    #[test]
    fn test_repack_requires_in_stock() {
        assert!(plan_partial_repack(CartonStatus::PendingScan, 50, 10).is_err());
        assert!(plan_partial_repack(CartonStatus::Picked, 50, 10).is_err());
    }

    #[test]
    fn test_double_scan_in_message() {
        let err = check_scan_in(CartonStatus::InStock).unwrap_err();
        assert_eq!(err.to_string(), "Already scanned in");
    }

    #[test]
    fn test_adjust_to_zero_scraps_carton() {
        let plan = plan_adjustment(CartonStatus::InStock, 12, -12, &manual("Damaged")).unwrap();
        assert_eq!(plan.new_quantity, 0);
        assert_eq!(plan.new_status, CartonStatus::Scrapped);
    }

    #[test]
    fn test_adjust_requires_reason() {
        let err = plan_adjustment(CartonStatus::InStock, 12, -2, &manual("  ")).unwrap_err();
        assert_eq!(err, CartonError::ReasonRequired);
    }

    #[test]
    fn test_stocktake_write_off_needs_no_reason() {
        let origin = AdjustmentOrigin::Stocktake {
            session_id: Uuid::new_v4(),
            session_name: "March count".to_string(),
        };
        let plan = plan_write_off(CartonStatus::InStock, 40, &origin).unwrap();
        assert_eq!(plan.quantity_change, -40);
        assert_eq!(plan.new_status, CartonStatus::Scrapped);
        assert!(origin.reason().contains("March count"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = CartonStatus> {
        prop_oneof![
            Just(CartonStatus::PendingScan),
            Just(CartonStatus::InStock),
            Just(CartonStatus::Picked),
            Just(CartonStatus::Scrapped),
            Just(CartonStatus::Consumed),
        ]
    }

    fn op_strategy() -> impl Strategy<Value = CartonOp> {
        prop_oneof![
            Just(CartonOp::ScanIn),
            Just(CartonOp::ScanOut),
            (1i32..200).prop_map(CartonOp::Repack),
            (-200i32..200).prop_map(CartonOp::Adjust),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 2: Carton Conservation
        /// A repack taking t of q writes -q and +(q-t): net -t
        #[test]
        fn prop_repack_conserves_units(
            quantity in 2i32..10_000,
            taken_fraction in 0.0f64..1.0
        ) {
            let taken = ((f64::from(quantity - 1) * taken_fraction) as i32).max(1);
            let plan = plan_partial_repack(CartonStatus::InStock, quantity, taken).unwrap();

            prop_assert_eq!(plan.remaining, quantity - taken);
            prop_assert_eq!(plan.net_change(), -taken);
            prop_assert!(plan.remaining > 0);
        }

        /// Property 3: Monotonic Status
        /// Once terminal, every further action is refused
        #[test]
        fn prop_terminal_status_is_final(
            start in status_strategy(),
            quantity in 1i32..500,
            ops in prop::collection::vec(op_strategy(), 1..20)
        ) {
            let mut status = start;
            let mut quantity = quantity;

            for op in &ops {
                let result = apply(status, quantity, op);
                if status.is_terminal() {
                    prop_assert!(result.is_err(), "{:?} left terminal {:?}", op, status);
                }
                if let Ok((next, next_quantity)) = result {
                    status = next;
                    quantity = next_quantity;
                }
            }
        }

        /// Property 4: Adjustment Floor
        /// An adjustment never leaves a negative quantity
        #[test]
        fn prop_adjustment_never_negative(
            quantity in 0i32..1_000,
            change in -2_000i32..2_000
        ) {
            match plan_adjustment(CartonStatus::InStock, quantity, change, &manual("Recount")) {
                Ok(plan) => {
                    prop_assert!(plan.new_quantity >= 0);
                    prop_assert_eq!(plan.new_quantity, quantity + change);
                    prop_assert_eq!(plan.new_status == CartonStatus::Scrapped, plan.new_quantity == 0);
                }
                Err(err) => {
                    prop_assert!(quantity + change < 0);
                    let is_negative = matches!(err, CartonError::NegativeQuantity { .. });
                    prop_assert!(is_negative);
                }
            }
        }

        /// Property 3: Only pending cartons can be scanned in
        #[test]
        fn prop_scan_in_only_from_pending(status in status_strategy()) {
            prop_assert_eq!(check_scan_in(status).is_ok(), status == CartonStatus::PendingScan);
            prop_assert_eq!(check_scan_out(status).is_ok(), status == CartonStatus::InStock);
        }
    }
}
