//! Stock verification and works-order completion tests
//!
//! Tests for the approval / verification reconciliation including:
//! - Property 5: Adjusted Quantity Floor
//! - Property 6: Completion Idempotency
//! - Property 7: No-Stock Fast Path
//! - Partial stock scenario (100 ordered, 30 on hand)

use chrono::Utc;
use proptest::prelude::*;
use shared::{
    adjusted_quantity, check_confirm, check_expire, evaluate_completion, needs_verification,
    summarize, CompletionDecision, GenerationPath, GenerationPlan, NotReady, Order, OrderLineItem,
    OrderStatus, StockVerification, VerificationError, VerificationStatus,
};
use uuid::Uuid;

fn order(status: OrderStatus) -> Order {
    Order {
        id: Uuid::new_v4(),
        email_id: None,
        status,
        customer_name: Some("Acme Packaging".to_string()),
        po_number: Some("PO-7781".to_string()),
        po_date: None,
        delivery_date: None,
        special_instructions: None,
        extraction_confidence: None,
        approved_by: None,
        approved_at: None,
        rejected_reason: None,
        stock_checked_at: Some(Utc::now()),
        office_order_file: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn line(order: &Order, line_number: i32, quantity: i32) -> OrderLineItem {
    OrderLineItem {
        id: Uuid::new_v4(),
        order_id: order.id,
        line_number,
        product_code: Some("P100".to_string()),
        matched_product_code: Some("P100".to_string()),
        product_description: Some("100mm pot".to_string()),
        colour: Some("Black".to_string()),
        quantity,
        unit_price: None,
        line_total: None,
        confidence: None,
        needs_review: false,
        works_order_file: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn verification(item: &OrderLineItem, on_hand: i32) -> StockVerification {
    StockVerification {
        id: Uuid::new_v4(),
        order_id: item.order_id,
        order_line_item_id: item.id,
        product_code: "P100".to_string(),
        colour: "Black".to_string(),
        system_stock_quantity: on_hand,
        verified_quantity: None,
        status: VerificationStatus::Pending,
        verified_by: None,
        verified_at: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn confirm(v: &mut StockVerification, quantity: i32) {
    check_confirm(v.status, quantity).unwrap();
    v.status = VerificationStatus::Confirmed;
    v.verified_quantity = Some(quantity);
    v.verified_at = Some(Utc::now());
}

/// Write what a successful generation writes
fn record_generation(order: &mut Order, items: &mut [OrderLineItem], plan: &GenerationPlan) {
    order.status = OrderStatus::WorksOrderGenerated;
    order.office_order_file = Some(b"office".to_vec());
    for line in plan.lines.iter().filter(|l| l.generate_works_order) {
        if let Some(item) = items.iter_mut().find(|i| i.id == line.line_item_id) {
            item.works_order_file = Some(b"works".to_vec());
        }
    }
}

fn plan_of(decision: CompletionDecision) -> GenerationPlan {
    match decision {
        CompletionDecision::Generate(plan) => plan,
        other => panic!("expected generation, got {:?}", other),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 100 ordered, 30 on hand: verification gates generation, then the
    /// works order asks for 70.
    #[test]
    fn test_partial_stock_scenario() {
        let mut o = order(OrderStatus::Pending);
        let item = line(&o, 1, 100);

        let on_hand = 30;
        assert!(needs_verification(on_hand));
        let mut v = verification(&item, on_hand as i32);
        assert_eq!(v.system_stock_quantity, 30);

        o.status = OrderStatus::Approved;
        let decision = evaluate_completion(&o, &[item.clone()], &[v.clone()]);
        assert_eq!(
            decision,
            CompletionDecision::NotReady(NotReady::PendingVerifications { pending: 1 })
        );

        confirm(&mut v, 30);
        let plan = plan_of(evaluate_completion(&o, &[item.clone()], &[v]));

        assert_eq!(plan.path, GenerationPath::StockAdjusted);
        let line = &plan.lines[0];
        assert_eq!(line.ordered_quantity, 100);
        assert_eq!(line.confirmed_stock, 30);
        assert_eq!(line.produce_quantity, 70);
        assert_eq!(line.adjusted_quantity(plan.path), Some(70));
        assert_eq!(line.verified_stock(plan.path), Some(30));
    }

    #[test]
    fn test_pending_order_never_generates() {
        let o = order(OrderStatus::Pending);
        let item = line(&o, 1, 10);
        let decision = evaluate_completion(&o, &[item], &[]);
        assert_eq!(
            decision,
            CompletionDecision::NotReady(NotReady::OrderNotApproved {
                status: OrderStatus::Pending
            })
        );
    }

    #[test]
    fn test_stock_covering_line_skips_works_order() {
        let o = order(OrderStatus::Approved);
        let item = line(&o, 1, 40);
        let mut v = verification(&item, 55);
        confirm(&mut v, 55);

        let plan = plan_of(evaluate_completion(&o, &[item], &[v]));
        assert_eq!(plan.lines[0].produce_quantity, 0);
        assert!(!plan.lines[0].generate_works_order);
        assert_eq!(plan.works_order_count(), 0);
    }

    #[test]
    fn test_expired_verification_gives_no_credit() {
        let o = order(OrderStatus::Approved);
        let item = line(&o, 1, 40);
        let mut v = verification(&item, 25);
        check_expire(v.status).unwrap();
        v.status = VerificationStatus::Expired;

        let plan = plan_of(evaluate_completion(&o, &[item], &[v]));
        assert_eq!(plan.path, GenerationPath::StockAdjusted);
        assert_eq!(plan.lines[0].produce_quantity, 40);
    }

    #[test]
    fn test_resolved_verification_is_final() {
        let err = check_confirm(VerificationStatus::Confirmed, 5).unwrap_err();
        assert_eq!(err, VerificationError::NotPendingForConfirm(VerificationStatus::Confirmed));
        assert!(check_expire(VerificationStatus::Expired).is_err());
        assert!(check_confirm(VerificationStatus::Pending, -1).is_err());
    }

    #[test]
    fn test_summary_counts() {
        let o = order(OrderStatus::Approved);
        let a = line(&o, 1, 10);
        let b = line(&o, 2, 10);
        let mut va = verification(&a, 4);
        let vb = verification(&b, 4);
        confirm(&mut va, 4);

        let summary = summarize(&[va, vb]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.pending, 1);
        assert!(!summary.all_resolved);
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

        /// Property 5: Adjusted Quantity Floor
        /// produce = max(0, ordered - confirmed), never negative
        #[test]
        fn prop_adjusted_quantity_floor(
            ordered in -1_000i32..100_000,
            confirmed in -1_000i32..100_000
        ) {
            let produce = adjusted_quantity(ordered, confirmed);
            prop_assert!(produce >= 0);
            prop_assert_eq!(produce, (ordered - confirmed).max(0));
        }

        /// Property 5: Extreme inputs do not overflow
        #[test]
        fn prop_adjusted_quantity_saturates(ordered in any::<i32>(), confirmed in any::<i32>()) {
            prop_assert!(adjusted_quantity(ordered, confirmed) >= 0);
        }

        /// Property 6: Completion Idempotency
        /// A second check after a generation is a no-op
        #[test]
        fn prop_completion_generates_once(
            quantities in prop::collection::vec(1i32..5_000, 1..8),
            stock in prop::collection::vec(proptest::option::of(0i32..5_000), 1..8)
        ) {
            let mut o = order(OrderStatus::Approved);
            let mut items: Vec<OrderLineItem> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| line(&o, i as i32 + 1, *q))
                .collect();

            let verifications: Vec<StockVerification> = items
                .iter()
                .zip(stock.iter())
                .filter_map(|(item, s)| s.map(|count| {
                    let mut v = verification(item, count);
                    confirm(&mut v, count);
                    v
                }))
                .collect();

            let first = evaluate_completion(&o, &items, &verifications);
            let again = evaluate_completion(&o, &items, &verifications);
            prop_assert_eq!(&first, &again);

            let plan = plan_of(first);
            record_generation(&mut o, &mut items, &plan);

            let second = evaluate_completion(&o, &items, &verifications);
            prop_assert_eq!(second, CompletionDecision::NotReady(NotReady::AlreadyGenerated));
        }

        /// Property 7: No-Stock Fast Path
        /// No verifications: every line is produced at its ordered quantity
        #[test]
        fn prop_no_stock_generates_in_full(
            quantities in prop::collection::vec(0i32..5_000, 1..10),
            verified in prop::bool::ANY
        ) {
            let status = if verified { OrderStatus::Verified } else { OrderStatus::Approved };
            let o = order(status);
            let items: Vec<OrderLineItem> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| line(&o, i as i32 + 1, *q))
                .collect();

            prop_assert!(!needs_verification(0));

            let plan = plan_of(evaluate_completion(&o, &items, &[]));
            prop_assert_eq!(plan.path, GenerationPath::NoStock);
            prop_assert_eq!(plan.works_order_count(), items.len());
            for (line, q) in plan.lines.iter().zip(quantities.iter()) {
                prop_assert_eq!(line.produce_quantity, *q);
                prop_assert_eq!(line.adjusted_quantity(plan.path), None);
            }
        }

        /// Any pending verification blocks generation
        #[test]
        fn prop_pending_blocks_generation(
            quantity in 1i32..5_000,
            on_hand in 1i32..5_000
        ) {
            let o = order(OrderStatus::Approved);
            let item = line(&o, 1, quantity);
            let v = verification(&item, on_hand);

            let decision = evaluate_completion(&o, &[item], &[v]);
            prop_assert!(!decision.is_generate());
        }
    }
}
