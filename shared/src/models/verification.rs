//! Stock verification and works-order completion decision
//!
//! An order line with stock on hand gets a verification task when the order
//! is created. Works orders are only produced once the order is approved and
//! no task is still pending. Confirmed stock reduces the quantity to
//! produce; expired tasks give no credit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::order::{Order, OrderLineItem, OrderStatus};

/// Status of a verification task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Confirmed,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Confirmed => "confirmed",
            VerificationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "confirmed" => Some(VerificationStatus::Confirmed),
            "expired" => Some(VerificationStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification state violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Verification is '{0}', must be 'pending'")]
    NotPendingForConfirm(VerificationStatus),

    #[error("Verification is '{0}', must be 'pending' to expire")]
    NotPendingForExpire(VerificationStatus),

    #[error("Verified quantity cannot be negative (got {0})")]
    NegativeQuantity(i32),
}

/// One warehouse stock check for an order line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockVerification {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_line_item_id: Uuid,
    pub product_code: String,
    pub colour: String,
    /// On-hand quantity when the task was created; never updated
    pub system_stock_quantity: i32,
    pub verified_quantity: Option<i32>,
    pub status: VerificationStatus,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockVerification {
    /// Stock credit this task gives its line: the confirmed count, or zero
    pub fn credit(&self) -> i32 {
        match self.status {
            VerificationStatus::Confirmed => self.verified_quantity.unwrap_or(0).max(0),
            VerificationStatus::Pending | VerificationStatus::Expired => 0,
        }
    }
}

/// Check that a task may be confirmed with `verified_quantity`
pub fn check_confirm(status: VerificationStatus, verified_quantity: i32) -> Result<(), VerificationError> {
    if status != VerificationStatus::Pending {
        return Err(VerificationError::NotPendingForConfirm(status));
    }
    if verified_quantity < 0 {
        return Err(VerificationError::NegativeQuantity(verified_quantity));
    }
    Ok(())
}

/// Check that a task may be expired
pub fn check_expire(status: VerificationStatus) -> Result<(), VerificationError> {
    if status != VerificationStatus::Pending {
        return Err(VerificationError::NotPendingForExpire(status));
    }
    Ok(())
}

/// Quantity still to manufacture once confirmed stock is taken off
pub fn adjusted_quantity(ordered: i32, confirmed: i32) -> i32 {
    ordered.saturating_sub(confirmed).max(0)
}

/// Whether a verification task is needed for this much stock on hand
pub fn needs_verification(on_hand: i64) -> bool {
    on_hand > 0
}

/// Counts shown alongside an order's verifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub expired: usize,
    pub all_resolved: bool,
}

pub fn summarize(verifications: &[StockVerification]) -> VerificationSummary {
    let count = |status: VerificationStatus| verifications.iter().filter(|v| v.status == status).count();
    let pending = count(VerificationStatus::Pending);

    VerificationSummary {
        total: verifications.len(),
        pending,
        confirmed: count(VerificationStatus::Confirmed),
        expired: count(VerificationStatus::Expired),
        all_resolved: pending == 0,
    }
}

/// Why documents are not generated yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotReady {
    /// Order is not approved (or was rejected / failed)
    OrderNotApproved { status: OrderStatus },
    /// Documents already exist; nothing to do
    AlreadyGenerated,
    /// Warehouse still has to confirm these tasks
    PendingVerifications { pending: usize },
}

/// Which quantities the works orders are written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPath {
    /// No verification tasks exist: produce every line in full
    NoStock,
    /// Quantities reduced by confirmed stock
    StockAdjusted,
}

/// Per-line production decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePlan {
    pub line_item_id: Uuid,
    pub line_number: i32,
    pub ordered_quantity: i32,
    pub confirmed_stock: i32,
    pub produce_quantity: i32,
    /// False when stock covers the whole line
    pub generate_works_order: bool,
}

impl LinePlan {
    /// Adjusted quantity handed to the document generator, `None` on the
    /// no-stock path.
    pub fn adjusted_quantity(&self, path: GenerationPath) -> Option<i32> {
        match path {
            GenerationPath::NoStock => None,
            GenerationPath::StockAdjusted => Some(self.produce_quantity),
        }
    }

    /// Confirmed stock handed to the document generator, `None` on the
    /// no-stock path.
    pub fn verified_stock(&self, path: GenerationPath) -> Option<i32> {
        match path {
            GenerationPath::NoStock => None,
            GenerationPath::StockAdjusted => Some(self.confirmed_stock),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub path: GenerationPath,
    pub lines: Vec<LinePlan>,
}

impl GenerationPlan {
    pub fn works_order_count(&self) -> usize {
        self.lines.iter().filter(|l| l.generate_works_order).count()
    }
}

/// Outcome of a completion check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CompletionDecision {
    NotReady(NotReady),
    Generate(GenerationPlan),
}

impl CompletionDecision {
    pub fn is_generate(&self) -> bool {
        matches!(self, CompletionDecision::Generate(_))
    }
}

/// Decide whether an order's documents may be generated now.
///
/// Pure over already-loaded state; the caller holds the order row lock
/// while evaluating and writing so two racing checks cannot both generate.
pub fn evaluate_completion(
    order: &Order,
    items: &[OrderLineItem],
    verifications: &[StockVerification],
) -> CompletionDecision {
    if order.status == OrderStatus::WorksOrderGenerated
        || order.has_office_order()
        || items.iter().any(OrderLineItem::has_works_order)
    {
        return CompletionDecision::NotReady(NotReady::AlreadyGenerated);
    }

    if !order.status.allows_generation() {
        return CompletionDecision::NotReady(NotReady::OrderNotApproved {
            status: order.status,
        });
    }

    let pending = verifications
        .iter()
        .filter(|v| v.status == VerificationStatus::Pending)
        .count();
    if pending > 0 {
        return CompletionDecision::NotReady(NotReady::PendingVerifications { pending });
    }

    let mut lines: Vec<&OrderLineItem> = items.iter().collect();
    lines.sort_by_key(|item| item.line_number);

    if verifications.is_empty() {
        let lines = lines
            .into_iter()
            .map(|item| LinePlan {
                line_item_id: item.id,
                line_number: item.line_number,
                ordered_quantity: item.quantity,
                confirmed_stock: 0,
                produce_quantity: item.quantity,
                generate_works_order: true,
            })
            .collect();

        return CompletionDecision::Generate(GenerationPlan {
            path: GenerationPath::NoStock,
            lines,
        });
    }

    let mut credit: HashMap<Uuid, i32> = HashMap::new();
    for v in verifications {
        *credit.entry(v.order_line_item_id).or_insert(0) += v.credit();
    }

    let lines = lines
        .into_iter()
        .map(|item| {
            let confirmed_stock = credit.get(&item.id).copied().unwrap_or(0);
            let produce_quantity = adjusted_quantity(item.quantity, confirmed_stock);
            LinePlan {
                line_item_id: item.id,
                line_number: item.line_number,
                ordered_quantity: item.quantity,
                confirmed_stock,
                produce_quantity,
                generate_works_order: produce_quantity > 0,
            }
        })
        .collect();

    CompletionDecision::Generate(GenerationPlan {
        path: GenerationPath::StockAdjusted,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            email_id: None,
            status,
            customer_name: Some("Acme".to_string()),
            po_number: Some("4500123".to_string()),
            po_date: None,
            delivery_date: None,
            special_instructions: None,
            extraction_confidence: None,
            approved_by: None,
            approved_at: None,
            rejected_reason: None,
            stock_checked_at: None,
            office_order_file: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(order_id: Uuid, line_number: i32, quantity: i32) -> OrderLineItem {
        OrderLineItem {
            id: Uuid::new_v4(),
            order_id,
            line_number,
            product_code: Some("CUP-200".to_string()),
            matched_product_code: Some("CUP-200".to_string()),
            product_description: None,
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

    fn verification(item: &OrderLineItem, status: VerificationStatus, verified: Option<i32>) -> StockVerification {
        StockVerification {
            id: Uuid::new_v4(),
            order_id: item.order_id,
            order_line_item_id: item.id,
            product_code: "CUP-200".to_string(),
            colour: "Black".to_string(),
            system_stock_quantity: 30,
            verified_quantity: verified,
            status,
            verified_by: None,
            verified_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_adjusted_quantity_floor() {
        assert_eq!(adjusted_quantity(100, 30), 70);
        assert_eq!(adjusted_quantity(100, 150), 0);
        assert_eq!(adjusted_quantity(0, 0), 0);
    }

    #[test]
    fn test_pending_order_not_ready() {
        let o = order(OrderStatus::Pending);
        let items = vec![item(o.id, 1, 100)];
        assert_eq!(
            evaluate_completion(&o, &items, &[]),
            CompletionDecision::NotReady(NotReady::OrderNotApproved {
                status: OrderStatus::Pending
            })
        );
    }

    #[test]
    fn test_no_stock_fast_path() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 2, 40), item(o.id, 1, 100)];
        match evaluate_completion(&o, &items, &[]) {
            CompletionDecision::Generate(plan) => {
                assert_eq!(plan.path, GenerationPath::NoStock);
                assert_eq!(plan.lines[0].line_number, 1);
                assert_eq!(plan.lines[0].produce_quantity, 100);
                assert_eq!(plan.lines[0].adjusted_quantity(plan.path), None);
                assert_eq!(plan.works_order_count(), 2);
            }
            other => panic!("expected generation, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_verification_blocks() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 1, 100)];
        let v = vec![verification(&items[0], VerificationStatus::Pending, None)];
        assert_eq!(
            evaluate_completion(&o, &items, &v),
            CompletionDecision::NotReady(NotReady::PendingVerifications { pending: 1 })
        );
    }

    #[test]
    fn test_confirmed_stock_reduces_production() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 1, 100)];
        let v = vec![verification(&items[0], VerificationStatus::Confirmed, Some(30))];
        match evaluate_completion(&o, &items, &v) {
            CompletionDecision::Generate(plan) => {
                assert_eq!(plan.path, GenerationPath::StockAdjusted);
                assert_eq!(plan.lines[0].produce_quantity, 70);
                assert_eq!(plan.lines[0].verified_stock(plan.path), Some(30));
            }
            other => panic!("expected generation, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_gives_no_credit() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 1, 100)];
        let v = vec![verification(&items[0], VerificationStatus::Expired, None)];
        match evaluate_completion(&o, &items, &v) {
            CompletionDecision::Generate(plan) => {
                assert_eq!(plan.path, GenerationPath::StockAdjusted);
                assert_eq!(plan.lines[0].produce_quantity, 100);
                assert_eq!(plan.lines[0].adjusted_quantity(plan.path), Some(100));
            }
            other => panic!("expected generation, got {:?}", other),
        }
    }

    #[test]
    fn test_fully_covered_line_skips_works_order() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 1, 20), item(o.id, 2, 50)];
        let v = vec![verification(&items[0], VerificationStatus::Confirmed, Some(25))];
        match evaluate_completion(&o, &items, &v) {
            CompletionDecision::Generate(plan) => {
                assert!(!plan.lines[0].generate_works_order);
                assert!(plan.lines[1].generate_works_order);
                assert_eq!(plan.works_order_count(), 1);
            }
            other => panic!("expected generation, got {:?}", other),
        }
    }

    #[test]
    fn test_existing_documents_are_never_regenerated() {
        let o = order(OrderStatus::Approved);
        let mut items = vec![item(o.id, 1, 100)];
        items[0].works_order_file = Some(vec![1, 2, 3]);
        assert_eq!(
            evaluate_completion(&o, &items, &[]),
            CompletionDecision::NotReady(NotReady::AlreadyGenerated)
        );

        let done = order(OrderStatus::WorksOrderGenerated);
        let items = vec![item(done.id, 1, 100)];
        assert_eq!(
            evaluate_completion(&done, &items, &[]),
            CompletionDecision::NotReady(NotReady::AlreadyGenerated)
        );
    }

    #[test]
    fn test_verified_status_may_retry() {
        let o = order(OrderStatus::Verified);
        let items = vec![item(o.id, 1, 100)];
        assert!(evaluate_completion(&o, &items, &[]).is_generate());
    }

    #[test]
    fn test_confirm_and_expire_guards() {
        assert_eq!(check_confirm(VerificationStatus::Pending, 10), Ok(()));
        let err = check_confirm(VerificationStatus::Confirmed, 10).unwrap_err();
        assert_eq!(err.to_string(), "Verification is 'confirmed', must be 'pending'");
        assert_eq!(
            check_confirm(VerificationStatus::Pending, -1),
            Err(VerificationError::NegativeQuantity(-1))
        );
        let err = check_expire(VerificationStatus::Expired).unwrap_err();
        assert_eq!(err.to_string(), "Verification is 'expired', must be 'pending' to expire");
    }

    #[test]
    fn test_summary() {
        let o = order(OrderStatus::Approved);
        let items = vec![item(o.id, 1, 10), item(o.id, 2, 10)];
        let v = vec![
            verification(&items[0], VerificationStatus::Confirmed, Some(5)),
            verification(&items[1], VerificationStatus::Expired, None),
        ];
        let summary = summarize(&v);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.expired, 1);
        assert!(summary.all_resolved);
    }
}
