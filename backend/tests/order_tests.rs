//! Order intake tests
//!
//! Tests for extracted order handling including:
//! - Property 9: Line Total Rounding
//! - Property 10: Review Flagging
//! - Order state transitions

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    confidence_decimal, line_total, require_pending, ExtractedLineItem, ExtractedOrder, FieldValue,
    OrderError, OrderStatus, REVIEW_CONFIDENCE_THRESHOLD,
};

fn extracted_line(code: Option<&str>, quantity: Option<i32>, confidence: f64) -> ExtractedLineItem {
    ExtractedLineItem {
        product_code: code.map_or_else(FieldValue::missing, |c| FieldValue::new(c.to_string(), confidence)),
        description: FieldValue::new("Round tub 500ml".to_string(), confidence),
        colour: FieldValue::new("White".to_string(), confidence),
        quantity: quantity.map_or_else(FieldValue::missing, |q| FieldValue::new(q, confidence)),
        unit_price: FieldValue::new(Decimal::new(125, 2), confidence),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_line_total_rounds_to_cents() {
        assert_eq!(line_total(3, Some(Decimal::new(3333, 3))), Some(Decimal::new(1000, 2)));
        assert_eq!(line_total(10, None), None);
    }

    #[test]
    fn test_extraction_payload_parses() {
        let json = r#"{
            "customer_name": {"value": "Acme Packaging", "confidence": 0.97},
            "po_number": {"value": "PO-7781", "confidence": 0.99},
            "po_date": {"value": "2026-02-03", "confidence": 0.9},
            "overall_confidence": 0.91,
            "line_items": [
                {
                    "product_code": {"value": " P100 ", "confidence": 0.95},
                    "quantity": {"value": 500, "confidence": 0.9},
                    "description": {"value": "100mm pot", "confidence": 0.85}
                }
            ]
        }"#;

        let order: ExtractedOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.customer_name.value.as_deref(), Some("Acme Packaging"));
        assert!(!order.delivery_date.is_present());
        assert_eq!(order.line_items.len(), 1);

        let line = &order.line_items[0];
        assert_eq!(line.product_code(), Some("P100"));
        assert_eq!(line.quantity(), 500);
        assert!(!line.needs_review(Some("P100")));
        assert!(line.needs_review(None));
    }

    #[test]
    fn test_unmatched_code_needs_review() {
        let line = extracted_line(Some("ZZ9"), Some(10), 0.99);
        assert!(line.needs_review(None));
    }

    #[test]
    fn test_missing_quantity_is_zero_and_reviewed() {
        let line = extracted_line(Some("P100"), None, 0.99);
        assert_eq!(line.quantity(), 0);
        assert!(line.needs_review(Some("P100")));
    }

    #[test]
    fn test_only_pending_orders_are_editable() {
        assert!(require_pending(OrderStatus::Pending).is_ok());
        let err = require_pending(OrderStatus::Approved).unwrap_err();
        assert_eq!(
            err,
            OrderError::WrongStatus {
                current: OrderStatus::Approved,
                required: OrderStatus::Pending
            }
        );
    }

    #[test]
    fn test_order_state_machine() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Approved));
        assert!(OrderStatus::Approved.can_transition_to(OrderStatus::Verified));
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Approved));
        assert!(!OrderStatus::WorksOrderGenerated.can_transition_to(OrderStatus::Verified));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for unit prices with up to four decimal places
    fn price_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000i64).prop_map(|n| Decimal::new(n, 4))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 9: Line Total Rounding
        /// Totals carry at most two decimal places and stay within half a cent
        #[test]
        fn prop_line_total_rounded(quantity in 0i32..100_000, price in price_strategy()) {
            let total = line_total(quantity, Some(price)).unwrap();
            let exact = price * Decimal::from(quantity);

            prop_assert!(total.scale() <= 2);
            prop_assert!((total - exact).abs() <= Decimal::new(5, 3));
        }

        /// Property 10: Review Flagging
        /// Matched lines with a quantity need review only below the threshold
        #[test]
        fn prop_low_confidence_needs_review(confidence in 0.0f64..=1.0, quantity in 1i32..10_000) {
            prop_assume!((confidence - REVIEW_CONFIDENCE_THRESHOLD).abs() > 1e-9);
            let line = extracted_line(Some("P100"), Some(quantity), confidence);
            prop_assert_eq!(
                line.needs_review(Some("P100")),
                confidence < REVIEW_CONFIDENCE_THRESHOLD
            );
        }

        /// Stored confidences land in 0..=1 with two places
        #[test]
        fn prop_confidence_decimal_bounds(confidence in -2.0f64..3.0) {
            let stored = confidence_decimal(confidence);
            prop_assert!(stored >= Decimal::ZERO);
            prop_assert!(stored <= Decimal::ONE);
            prop_assert!(stored.scale() <= 2);
        }
    }
}
