//! Stock verification and works-order completion service
//!
//! Verification tasks are created once per order. Every event that can
//! unblock an order (approval, a confirmation, an expiry, an explicit retry)
//! ends with `check_completion`, which locks the order row, decides with
//! `evaluate_completion` and writes the documents in the same transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    check_confirm, check_expire, evaluate_completion, needs_verification, summarize, transition,
    CompletionDecision, GenerationPlan, Order, OrderLineItem, OrderStatus, StockVerification,
    VerificationSummary,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::DocumentGenerator;
use crate::services::stock::on_hand_quantity;

/// Stock verification service
#[derive(Clone)]
pub struct StockVerificationService {
    db: PgPool,
    documents: Arc<dyn DocumentGenerator>,
}

/// Verification after a confirm or expire, plus what the completion check did
#[derive(Debug, Serialize)]
pub struct VerificationOutcome {
    pub verification: StockVerification,
    pub completion: CompletionDecision,
}

/// Pending task with the order line it checks
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PendingVerificationLine {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub verification: StockVerification,
    pub line_number: i32,
    pub ordered_quantity: i32,
    pub product_description: Option<String>,
}

#[derive(Debug, FromRow)]
struct PendingRow {
    #[sqlx(flatten)]
    line: PendingVerificationLine,
    customer_name: Option<String>,
    po_number: Option<String>,
    order_status: OrderStatus,
    order_created_at: DateTime<Utc>,
}

/// Pending tasks of one order
#[derive(Debug, Clone, Serialize)]
pub struct PendingOrderGroup {
    pub order_id: Uuid,
    pub customer_name: Option<String>,
    pub po_number: Option<String>,
    pub order_status: OrderStatus,
    pub order_created_at: DateTime<Utc>,
    pub verifications: Vec<PendingVerificationLine>,
}

/// Every task of an order with counts
#[derive(Debug, Clone, Serialize)]
pub struct OrderVerifications {
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub verifications: Vec<StockVerification>,
    pub summary: VerificationSummary,
}

/// Office order bytes plus one works order per line that needs production
struct RenderedDocuments {
    office_order: Vec<u8>,
    works_orders: Vec<(Uuid, Vec<u8>)>,
}

/// Create a pending task for each line whose product/colour has stock on
/// hand, then stamp the order as stock-checked. Runs inside the caller's
/// transaction.
pub(crate) async fn create_verifications_for_order(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<StockVerification>> {
    let items = sqlx::query_as::<_, OrderLineItem>(
        "SELECT * FROM order_line_items WHERE order_id = $1 ORDER BY line_number",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut created = Vec::new();
    for item in &items {
        let Some((product_code, colour)) = item.stock_key() else {
            continue;
        };

        let on_hand = on_hand_quantity(conn, product_code, colour).await?;
        if !needs_verification(on_hand) {
            continue;
        }

        let verification = sqlx::query_as::<_, StockVerification>(
            r#"
            INSERT INTO stock_verifications (
                order_id, order_line_item_id, product_code, colour, system_stock_quantity, status
            )
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(item.id)
        .bind(product_code)
        .bind(colour)
        .bind(i32::try_from(on_hand).unwrap_or(i32::MAX))
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            order_id = %order_id,
            line = item.line_number,
            product = %product_code,
            colour = %colour,
            on_hand,
            "Verification created"
        );
        created.push(verification);
    }

    sqlx::query("UPDATE orders SET stock_checked_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    Ok(created)
}

impl StockVerificationService {
    /// Create a new StockVerificationService instance
    pub fn new(db: PgPool, documents: Arc<dyn DocumentGenerator>) -> Self {
        Self { db, documents }
    }

    /// Record the warehouse count for a pending task
    pub async fn confirm(
        &self,
        verification_id: Uuid,
        verified_quantity: i32,
        notes: Option<String>,
        actor: Uuid,
    ) -> AppResult<VerificationOutcome> {
        let mut tx = self.db.begin().await?;

        let current = lock_verification(&mut tx, verification_id).await?;
        check_confirm(current.status, verified_quantity)?;

        let verification = sqlx::query_as::<_, StockVerification>(
            r#"
            UPDATE stock_verifications
            SET status = 'confirmed', verified_quantity = $2, verified_by = $3,
                verified_at = NOW(), notes = COALESCE($4, notes), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(verification_id)
        .bind(verified_quantity)
        .bind(actor)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            verification_id = %verification.id,
            order_id = %verification.order_id,
            product = %verification.product_code,
            colour = %verification.colour,
            system_quantity = verification.system_stock_quantity,
            verified_quantity,
            "Verification confirmed"
        );

        let completion = self.check_completion(verification.order_id).await?;
        Ok(VerificationOutcome {
            verification,
            completion,
        })
    }

    /// Give up on a stale task; its line gets no stock credit
    pub async fn expire(
        &self,
        verification_id: Uuid,
        notes: Option<String>,
        actor: Uuid,
    ) -> AppResult<VerificationOutcome> {
        let mut tx = self.db.begin().await?;

        let current = lock_verification(&mut tx, verification_id).await?;
        check_expire(current.status)?;

        let verification = sqlx::query_as::<_, StockVerification>(
            r#"
            UPDATE stock_verifications
            SET status = 'expired', verified_by = $2, verified_at = NOW(),
                notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(verification_id)
        .bind(actor)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            verification_id = %verification.id,
            order_id = %verification.order_id,
            product = %verification.product_code,
            colour = %verification.colour,
            "Verification expired"
        );

        let completion = self.check_completion(verification.order_id).await?;
        Ok(VerificationOutcome {
            verification,
            completion,
        })
    }

    /// Generate the order's documents if nothing blocks them any more.
    ///
    /// Safe to call any number of times. If rendering fails the order is
    /// left `verified` with no documents and a later call retries.
    pub async fn check_completion(&self, order_id: Uuid) -> AppResult<CompletionDecision> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        let items = sqlx::query_as::<_, OrderLineItem>(
            "SELECT * FROM order_line_items WHERE order_id = $1 ORDER BY line_number",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        let verifications = sqlx::query_as::<_, StockVerification>(
            "SELECT * FROM stock_verifications WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        let decision = evaluate_completion(&order, &items, &verifications);
        let CompletionDecision::Generate(plan) = &decision else {
            tracing::debug!(order_id = %order_id, decision = ?decision, "Completion check: not ready");
            return Ok(decision);
        };

        let mut status = order.status;
        if status == OrderStatus::Approved {
            status = transition(status, OrderStatus::Verified)?;
            sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .bind(status)
                .execute(&mut *tx)
                .await?;
        }
        let generated = transition(status, OrderStatus::WorksOrderGenerated)?;

        let rendered = match self.render(&order, &items, plan) {
            Ok(rendered) => rendered,
            Err(err) => {
                // keep `verified` so the next check can retry
                tx.commit().await?;
                tracing::error!(order_id = %order_id, error = %err, "Document generation failed");
                return Err(err);
            }
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET office_order_file = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(&rendered.office_order)
        .bind(generated)
        .execute(&mut *tx)
        .await?;

        for (line_item_id, bytes) in &rendered.works_orders {
            sqlx::query(
                "UPDATE order_line_items SET works_order_file = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(line_item_id)
            .bind(bytes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            path = ?plan.path,
            lines = plan.lines.len(),
            works_orders = rendered.works_orders.len(),
            "Works orders generated"
        );

        Ok(decision)
    }

    /// Render every document for a plan before anything is written
    fn render(
        &self,
        order: &Order,
        items: &[OrderLineItem],
        plan: &GenerationPlan,
    ) -> AppResult<RenderedDocuments> {
        let office_order = self.documents.office_order(order, items)?;

        let mut works_orders = Vec::new();
        for line in plan.lines.iter().filter(|l| l.generate_works_order) {
            let Some(item) = items.iter().find(|i| i.id == line.line_item_id) else {
                continue;
            };
            let bytes = self.documents.works_order(
                order,
                item,
                line.adjusted_quantity(plan.path),
                line.verified_stock(plan.path),
            )?;
            works_orders.push((item.id, bytes));
        }

        Ok(RenderedDocuments {
            office_order,
            works_orders,
        })
    }

    /// Pending tasks grouped by order, oldest first
    pub async fn pending_by_order(&self) -> AppResult<Vec<PendingOrderGroup>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT v.*,
                   li.line_number, li.quantity AS ordered_quantity, li.product_description,
                   o.customer_name, o.po_number, o.status AS order_status,
                   o.created_at AS order_created_at
            FROM stock_verifications v
            JOIN orders o ON o.id = v.order_id
            JOIN order_line_items li ON li.id = v.order_line_item_id
            WHERE v.status = 'pending'
            ORDER BY v.created_at ASC, li.line_number ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(group_pending(rows))
    }

    /// Every task for one order, with its summary
    pub async fn for_order(&self, order_id: Uuid) -> AppResult<OrderVerifications> {
        let order_status = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        let verifications = sqlx::query_as::<_, StockVerification>(
            "SELECT * FROM stock_verifications WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let summary = summarize(&verifications);
        Ok(OrderVerifications {
            order_id,
            order_status,
            verifications,
            summary,
        })
    }
}

async fn lock_verification(conn: &mut PgConnection, id: Uuid) -> AppResult<StockVerification> {
    sqlx::query_as::<_, StockVerification>(
        "SELECT * FROM stock_verifications WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Verification {}", id)))
}

fn group_pending(rows: Vec<PendingRow>) -> Vec<PendingOrderGroup> {
    let mut groups: Vec<PendingOrderGroup> = Vec::new();
    for row in rows {
        let order_id = row.line.verification.order_id;
        match groups.iter_mut().find(|g| g.order_id == order_id) {
            Some(group) => group.verifications.push(row.line),
            None => groups.push(PendingOrderGroup {
                order_id,
                customer_name: row.customer_name,
                po_number: row.po_number,
                order_status: row.order_status,
                order_created_at: row.order_created_at,
                verifications: vec![row.line],
            }),
        }
    }
    groups
}
