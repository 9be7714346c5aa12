//! Purchase order service
//!
//! Orders arrive from the extraction pipeline, are reviewed and edited while
//! pending, then approved or rejected by the office. Approval hands over to
//! the verification engine for the completion check.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    confidence_decimal, line_total, require_pending, transition, CompletionDecision, ExtractedOrder, Order,
    OrderError, OrderLineItem, OrderStatus, Pagination, PaginatedResponse,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::external::DocumentGenerator;
use crate::services::stock_verification::{create_verifications_for_order, StockVerificationService};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    documents: Arc<dyn DocumentGenerator>,
}

/// Row shown in the order list
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderSummary {
    pub id: Uuid,
    pub email_id: Option<Uuid>,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub po_number: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub extraction_confidence: Option<Decimal>,
    pub line_count: i64,
    pub needs_review_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

/// Order with its lines and which documents exist
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub line_items: Vec<OrderLineItem>,
    pub office_order_available: bool,
    /// Line numbers that have a works order
    pub works_order_lines: Vec<i32>,
}

/// Header fields editable while pending
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderInput {
    #[validate(length(max = 255))]
    pub customer_name: Option<String>,
    #[validate(length(max = 100))]
    pub po_number: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub special_instructions: Option<String>,
}

/// Line fields editable while pending
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLineItemInput {
    #[validate(custom = "shared::validate_product_code")]
    pub matched_product_code: Option<String>,
    #[validate(length(max = 255))]
    pub product_description: Option<String>,
    #[validate(custom = "shared::validate_colour")]
    pub colour: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub needs_review: Option<bool>,
}

/// Approved order and what the completion check did
#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub order: Order,
    pub completion: CompletionDecision,
}

/// Catalog code an extracted code refers to: exact match on an active
/// product, ignoring case.
async fn match_product_code(conn: &mut PgConnection, code: &str) -> AppResult<Option<String>> {
    let matched = sqlx::query_scalar::<_, String>(
        r#"
        SELECT product_code FROM products
        WHERE is_active AND UPPER(product_code) = UPPER($1)
        LIMIT 1
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(matched)
}

async fn existing_order_for_email(conn: &mut PgConnection, email_id: Uuid) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE email_id = $1")
        .bind(email_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

async fn mark_email_processed(
    conn: &mut PgConnection,
    email_id: Uuid,
    error: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE incoming_emails
        SET processed = TRUE, processing_error = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(email_id)
    .bind(error)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, documents: Arc<dyn DocumentGenerator>) -> Self {
        Self { db, documents }
    }

    /// Store an extracted order with its lines and create its stock
    /// verification tasks. An email only ever yields one order; a repeat
    /// returns the existing one.
    pub async fn create_from_extraction(
        &self,
        email_id: Option<Uuid>,
        extracted: &ExtractedOrder,
    ) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;

        if let Some(email_id) = email_id {
            if let Some(existing) = existing_order_for_email(&mut tx, email_id).await? {
                tracing::warn!(
                    order_id = %existing.id,
                    email_id = %email_id,
                    "Order already exists for email, skipping duplicate"
                );
                mark_email_processed(&mut tx, email_id, None).await?;
                tx.commit().await?;
                return Ok(existing);
            }
        }

        let raw = serde_json::to_value(extracted)
            .map_err(|e| anyhow::anyhow!("failed to serialise extraction: {}", e))?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                email_id, status, customer_name, po_number, po_date, delivery_date,
                special_instructions, extraction_confidence, extraction_raw_json
            )
            VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(email_id)
        .bind(trimmed(extracted.customer_name.value.as_ref()))
        .bind(trimmed(extracted.po_number.value.as_ref()))
        .bind(extracted.po_date.value)
        .bind(extracted.delivery_date.value)
        .bind(trimmed(extracted.special_instructions.value.as_ref()))
        .bind(confidence_decimal(extracted.overall_confidence))
        .bind(raw)
        .fetch_one(&mut *tx)
        .await?;

        let mut needs_review = 0;
        for (idx, line) in extracted.line_items.iter().enumerate() {
            let code = line.product_code();
            let matched = match code {
                Some(code) => match_product_code(&mut tx, code).await?,
                None => None,
            };
            let quantity = line.quantity();
            let unit_price = line.unit_price.value;
            let total = if quantity > 0 {
                line_total(quantity, unit_price)
            } else {
                None
            };
            let review = line.needs_review(matched.as_deref());
            if review {
                needs_review += 1;
            }

            sqlx::query(
                r#"
                INSERT INTO order_line_items (
                    order_id, line_number, product_code, matched_product_code,
                    product_description, colour, quantity, unit_price, line_total,
                    confidence, needs_review
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(order.id)
            .bind(i32::try_from(idx + 1).unwrap_or(i32::MAX))
            .bind(code)
            .bind(&matched)
            .bind(trimmed(line.description.value.as_ref()))
            .bind(trimmed(line.colour.value.as_ref()))
            .bind(quantity)
            .bind(unit_price)
            .bind(total)
            .bind(confidence_decimal(line.average_confidence()))
            .bind(review)
            .execute(&mut *tx)
            .await?;
        }

        let verifications = create_verifications_for_order(&mut tx, order.id).await?;

        if let Some(email_id) = email_id {
            mark_email_processed(&mut tx, email_id, None).await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            email_id = ?email_id,
            po_number = ?order.po_number,
            lines = extracted.line_items.len(),
            needs_review,
            verifications = verifications.len(),
            "Order created from extraction"
        );

        Ok(order)
    }

    /// Record a failed extraction as an `error` order so it stays visible
    pub async fn create_error_order(
        &self,
        email_id: Uuid,
        sender: Option<&str>,
        message: &str,
    ) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;

        if let Some(existing) = existing_order_for_email(&mut tx, email_id).await? {
            tracing::warn!(
                order_id = %existing.id,
                email_id = %email_id,
                "Order already exists for email, skipping error order"
            );
            tx.commit().await?;
            return Ok(existing);
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (email_id, status, customer_name, extraction_confidence, extraction_raw_json)
            VALUES ($1, 'error', $2, 0, $3)
            RETURNING *
            "#,
        )
        .bind(email_id)
        .bind(sender)
        .bind(serde_json::json!({ "error": message }))
        .fetch_one(&mut *tx)
        .await?;

        mark_email_processed(&mut tx, email_id, Some(message)).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, email_id = %email_id, error = %message, "Error order created");
        Ok(order)
    }

    /// Orders, newest first
    pub async fn list(
        &self,
        filter: OrderFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<OrderSummary>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE ($1::VARCHAR IS NULL OR status = $1)",
        )
        .bind(filter.status)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, OrderSummary>(
            r#"
            SELECT o.id, o.email_id, o.status, o.customer_name, o.po_number, o.po_date,
                   o.delivery_date, o.extraction_confidence, o.created_at,
                   COUNT(li.id) AS line_count,
                   COUNT(li.id) FILTER (WHERE li.needs_review) AS needs_review_count
            FROM orders o
            LEFT JOIN order_line_items li ON li.order_id = o.id
            WHERE ($1::VARCHAR IS NULL OR o.status = $1)
            GROUP BY o.id
            ORDER BY o.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data,
            pagination: pagination.meta(u64::try_from(total).unwrap_or(0)),
        })
    }

    pub async fn detail(&self, order_id: Uuid) -> AppResult<OrderDetail> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        let line_items = sqlx::query_as::<_, OrderLineItem>(
            "SELECT * FROM order_line_items WHERE order_id = $1 ORDER BY line_number",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let works_order_lines = line_items
            .iter()
            .filter(|item| item.has_works_order())
            .map(|item| item.line_number)
            .collect();

        Ok(OrderDetail {
            office_order_available: order.has_office_order(),
            order,
            line_items,
            works_order_lines,
        })
    }

    /// Edit header fields of a pending order
    pub async fn update(&self, order_id: Uuid, input: UpdateOrderInput) -> AppResult<Order> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, order_id).await?;
        require_pending(order.status)?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET customer_name = COALESCE($2, customer_name),
                po_number = COALESCE($3, po_number),
                po_date = COALESCE($4, po_date),
                delivery_date = COALESCE($5, delivery_date),
                special_instructions = COALESCE($6, special_instructions),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(trimmed(input.customer_name.as_ref()))
        .bind(trimmed(input.po_number.as_ref()))
        .bind(input.po_date)
        .bind(input.delivery_date)
        .bind(input.special_instructions)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, "Order updated");
        Ok(order)
    }

    /// Edit one line of a pending order; the line total is recomputed
    pub async fn update_line_item(
        &self,
        order_id: Uuid,
        line_item_id: Uuid,
        input: UpdateLineItemInput,
    ) -> AppResult<OrderLineItem> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, order_id).await?;
        require_pending(order.status)?;

        let current = sqlx::query_as::<_, OrderLineItem>(
            "SELECT * FROM order_line_items WHERE id = $1 AND order_id = $2 FOR UPDATE",
        )
        .bind(line_item_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Line item {}", line_item_id)))?;

        let quantity = input.quantity.unwrap_or(current.quantity);
        let unit_price = input.unit_price.or(current.unit_price);

        let item = sqlx::query_as::<_, OrderLineItem>(
            r#"
            UPDATE order_line_items
            SET matched_product_code = COALESCE($2, matched_product_code),
                product_description = COALESCE($3, product_description),
                colour = COALESCE($4, colour),
                quantity = $5,
                unit_price = $6,
                line_total = $7,
                needs_review = COALESCE($8, needs_review),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(line_item_id)
        .bind(input.matched_product_code)
        .bind(input.product_description)
        .bind(trimmed(input.colour.as_ref()))
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total(quantity, unit_price))
        .bind(input.needs_review)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            line = item.line_number,
            quantity = item.quantity,
            "Order line updated"
        );
        Ok(item)
    }

    /// Approve a pending order, then run the completion check
    pub async fn approve(&self, order_id: Uuid, actor: Uuid) -> AppResult<ApprovalOutcome> {
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, order_id).await?;
        require_pending(order.status)?;

        let line_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM order_line_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;
        if line_count == 0 {
            return Err(OrderError::NoLineItems.into());
        }

        // orders created before stock checking existed
        if order.stock_checked_at.is_none() {
            create_verifications_for_order(&mut tx, order_id).await?;
        }

        let next = transition(order.status, OrderStatus::Approved)?;
        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $3, approved_by = $2, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(actor)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, approved_by = %actor, "Order approved");

        let completion = StockVerificationService::new(self.db.clone(), self.documents.clone())
            .check_completion(order_id)
            .await?;

        Ok(ApprovalOutcome { order, completion })
    }

    /// Reject a pending order with a reason
    pub async fn reject(&self, order_id: Uuid, reason: &str) -> AppResult<Order> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::RejectionReasonRequired.into());
        }

        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, order_id).await?;
        require_pending(order.status)?;
        let next = transition(order.status, OrderStatus::Rejected)?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $3, rejected_reason = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(reason)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, reason = %reason, "Order rejected");
        Ok(order)
    }

    /// Office order document bytes
    pub async fn office_order(&self, order_id: Uuid) -> AppResult<(Order, Vec<u8>)> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        match order.office_order_file.clone() {
            Some(bytes) => Ok((order, bytes)),
            None => Err(AppError::NotFound(format!("Office order for order {}", order_id))),
        }
    }

    /// Works order document bytes for one line
    pub async fn works_order(
        &self,
        order_id: Uuid,
        line_item_id: Uuid,
    ) -> AppResult<(OrderLineItem, Vec<u8>)> {
        let item = sqlx::query_as::<_, OrderLineItem>(
            "SELECT * FROM order_line_items WHERE id = $1 AND order_id = $2",
        )
        .bind(line_item_id)
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Line item {}", line_item_id)))?;

        match item.works_order_file.clone() {
            Some(bytes) => Ok((item, bytes)),
            None => Err(AppError::NotFound(format!(
                "Works order for line {}",
                item.line_number
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(Some(&"  Acme ".to_string())), Some("Acme".to_string()));
        assert_eq!(trimmed(Some(&"   ".to_string())), None);
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_line_item_input_validation() {
        let input = UpdateLineItemInput {
            matched_product_code: Some("cup".to_string()),
            product_description: None,
            colour: Some(" ".to_string()),
            quantity: Some(-1),
            unit_price: None,
            needs_review: None,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("matched_product_code"));
        assert!(fields.contains_key("colour"));
        assert!(fields.contains_key("quantity"));
    }
}
