//! Carton lifecycle and stock aggregation service
//!
//! Every mutation locks its carton row, runs the shared precondition check
//! and writes the carton update plus its movement rows in one transaction.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    check_scan_in, check_scan_out, plan_adjustment, plan_partial_repack, repack_dates,
    resolve_threshold, threshold_status, validate_colour, validate_product_code,
    validate_threshold_bounds,
    AdjustmentOrigin, AdjustmentPlan, BoxType, CartonStatus, MovementType, Pagination,
    PaginatedResponse, StockItem, StockLevel, StockMovement, StockThreshold, ThresholdStatus,
    MAX_LABELS_PER_REQUEST,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};
use crate::external::render_label_sheet;
use crate::services::barcode::allocate_barcodes;

/// Stock service for cartons, movements and thresholds
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    barcode_prefix: String,
}

/// Input for printing a batch of carton labels
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateLabelsInput {
    #[validate(custom = "validate_product_code")]
    pub product_code: String,
    #[validate(custom = "validate_colour")]
    pub colour: String,
    #[validate(range(min = 1, message = "Quantity per carton must be at least 1"))]
    pub quantity_per_carton: i32,
    #[validate(range(min = 1, message = "At least one label is required"))]
    pub number_of_labels: i32,
    #[serde(default)]
    pub box_type: BoxType,
    pub production_date: Option<NaiveDate>,
}

/// Printed cartons and their label sheet
#[derive(Debug, Clone, Serialize)]
pub struct LabelBatch {
    pub barcodes: Vec<String>,
    pub cartons: Vec<StockItem>,
    #[serde(skip)]
    pub label_sheet: Vec<u8>,
}

/// Result of splitting a carton
#[derive(Debug, Clone, Serialize)]
pub struct RepackResult {
    pub original: StockItem,
    pub new_carton: StockItem,
    pub new_barcode: String,
    pub units_taken: i32,
    pub units_remaining: i32,
    /// Label sheet for the new carton, CSV
    pub label_csv: String,
}

/// Carton plus the movement its adjustment wrote
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentResult {
    pub stock_item: StockItem,
    pub movement: StockMovement,
}

/// Filters for the stock summary
#[derive(Debug, Default, Deserialize)]
pub struct SummaryFilter {
    /// Matches product code or description
    pub search: Option<String>,
    pub colour: Option<String>,
    pub status: Option<ThresholdStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSummaryItem {
    pub product_code: String,
    pub product_description: Option<String>,
    pub colour: String,
    pub carton_count: i64,
    pub total_units: i64,
    pub threshold_status: Option<ThresholdStatus>,
    pub red_threshold: Option<i32>,
    pub amber_threshold: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSummaryTotals {
    pub total_skus: usize,
    pub total_units: i64,
    pub total_cartons: i64,
    pub low_stock_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSummary {
    pub summary: StockSummaryTotals,
    pub items: Vec<StockSummaryItem>,
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    product_code: String,
    colour: String,
    product_description: Option<String>,
    carton_count: i64,
    total_quantity: i64,
}

/// Filters for the carton list
#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    pub product_code: Option<String>,
    pub colour: Option<String>,
    pub status: Option<CartonStatus>,
    /// Barcode substring
    pub search: Option<String>,
}

/// One carton with its audit trail, newest movement first
#[derive(Debug, Clone, Serialize)]
pub struct StockItemDetail {
    pub stock_item: StockItem,
    pub product_description: Option<String>,
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Deserialize)]
pub struct CreateThresholdInput {
    pub product_code: String,
    pub colour: Option<String>,
    pub red_threshold: Option<i32>,
    pub amber_threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateThresholdInput {
    pub red_threshold: Option<i32>,
    pub amber_threshold: Option<i32>,
}

/// Movement row about to be appended
pub(crate) struct NewMovement<'a> {
    pub stock_item_id: Uuid,
    pub movement_type: MovementType,
    pub quantity_change: i32,
    pub reason: Option<&'a str>,
    pub order_id: Option<Uuid>,
    pub stocktake_session_id: Option<Uuid>,
    pub performed_by: Uuid,
}

/// Append one movement row
pub(crate) async fn record_movement(
    conn: &mut PgConnection,
    movement: NewMovement<'_>,
) -> AppResult<StockMovement> {
    let row = sqlx::query_as::<_, StockMovement>(
        r#"
        INSERT INTO stock_movements (
            stock_item_id, movement_type, quantity_change, reason, order_id,
            stocktake_session_id, performed_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(movement.stock_item_id)
    .bind(movement.movement_type)
    .bind(movement.quantity_change)
    .bind(movement.reason)
    .bind(movement.order_id)
    .bind(movement.stocktake_session_id)
    .bind(movement.performed_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Read a carton by barcode and hold its row lock for the transaction
pub(crate) async fn lock_carton_by_barcode(
    conn: &mut PgConnection,
    barcode: &str,
) -> AppResult<StockItem> {
    sqlx::query_as::<_, StockItem>("SELECT * FROM stock_items WHERE barcode_id = $1 FOR UPDATE")
        .bind(barcode)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Barcode {}", barcode)))
}

/// Unknown order ids are reported as not found before anything is written
fn require_known_order(order_id: Uuid, exists: bool) -> AppResult<()> {
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Order {}", order_id)))
    }
}

async fn check_order_reference(conn: &mut PgConnection, order_id: Option<Uuid>) -> AppResult<()> {
    let Some(order_id) = order_id else {
        return Ok(());
    };
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;
    require_known_order(order_id, exists)
}

async fn lock_carton_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<StockItem> {
    sqlx::query_as::<_, StockItem>("SELECT * FROM stock_items WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock item {}", id)))
}

/// Apply an already-checked adjustment plan to a locked carton.
///
/// Manual adjustments and stocktake write-offs both come through here; the
/// plan must come from `plan_adjustment` or `plan_write_off`.
pub(crate) async fn apply_adjustment(
    conn: &mut PgConnection,
    carton: &StockItem,
    plan: AdjustmentPlan,
    origin: &AdjustmentOrigin,
    actor: Uuid,
) -> AppResult<AdjustmentResult> {
    let stock_item = sqlx::query_as::<_, StockItem>(
        r#"
        UPDATE stock_items
        SET quantity = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(carton.id)
    .bind(plan.new_quantity)
    .bind(plan.new_status)
    .fetch_one(&mut *conn)
    .await?;

    let reason = origin.reason();
    let movement = record_movement(
        conn,
        NewMovement {
            stock_item_id: carton.id,
            movement_type: MovementType::Adjustment,
            quantity_change: plan.quantity_change,
            reason: Some(&reason),
            order_id: None,
            stocktake_session_id: origin.stocktake_session_id(),
            performed_by: actor,
        },
    )
    .await?;

    tracing::info!(
        barcode = %carton.barcode_id,
        product = %carton.product_code,
        colour = %carton.colour,
        change = plan.quantity_change,
        new_quantity = plan.new_quantity,
        status = %plan.new_status,
        reason = %reason,
        "Stock adjusted"
    );

    Ok(AdjustmentResult {
        stock_item,
        movement,
    })
}

/// Units on hand for a product/colour: the sum of its in-stock cartons
pub(crate) async fn on_hand_quantity(
    conn: &mut PgConnection,
    product_code: &str,
    colour: &str,
) -> AppResult<i64> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(quantity), 0)::BIGINT
        FROM stock_items
        WHERE product_code = $1 AND colour = $2 AND status = 'in_stock'
        "#,
    )
    .bind(product_code)
    .bind(colour)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn like_pattern(value: Option<String>) -> Option<String> {
    blank_to_none(value).map(|v| format!("%{}%", v))
}

fn threshold_error(message: &str) -> AppError {
    AppError::Validation {
        field: "red_threshold".to_string(),
        message: message.to_string(),
    }
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(db: PgPool, barcode_prefix: impl Into<String>) -> Self {
        Self {
            db,
            barcode_prefix: barcode_prefix.into(),
        }
    }

    /// Create `pending_scan` cartons with fresh barcodes and render their labels
    pub async fn generate_labels(&self, input: GenerateLabelsInput) -> AppResult<LabelBatch> {
        input.validate()?;
        if input.number_of_labels > MAX_LABELS_PER_REQUEST {
            return Err(AppError::Validation {
                field: "number_of_labels".to_string(),
                message: format!("At most {} labels per request", MAX_LABELS_PER_REQUEST),
            });
        }

        let colour = input.colour.trim().to_string();
        let production_date = input
            .production_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut tx = self.db.begin().await?;

        let product = sqlx::query_as::<_, (bool, bool)>(
            "SELECT is_active, is_stockable FROM products WHERE product_code = $1",
        )
        .bind(&input.product_code)
        .fetch_optional(&mut *tx)
        .await?;

        match product {
            None => return Err(AppError::NotFound(format!("Product {}", input.product_code))),
            Some((false, _)) => {
                return Err(AppError::Validation {
                    field: "product_code".to_string(),
                    message: format!("Product {} is not active", input.product_code),
                })
            }
            Some((_, false)) => {
                return Err(AppError::Validation {
                    field: "product_code".to_string(),
                    message: format!("Product {} is not a stock item", input.product_code),
                })
            }
            Some(_) => {}
        }

        let count = u32::try_from(input.number_of_labels).unwrap_or(0);
        let barcodes = allocate_barcodes(
            &mut tx,
            &self.barcode_prefix,
            &input.product_code,
            &colour,
            production_date,
            count,
        )
        .await?;

        let mut cartons = Vec::with_capacity(barcodes.len());
        for barcode in &barcodes {
            let carton = sqlx::query_as::<_, StockItem>(
                r#"
                INSERT INTO stock_items (
                    barcode_id, product_code, colour, quantity, box_type, status, production_date
                )
                VALUES ($1, $2, $3, $4, $5, 'pending_scan', $6)
                RETURNING *
                "#,
            )
            .bind(barcode)
            .bind(&input.product_code)
            .bind(&colour)
            .bind(input.quantity_per_carton)
            .bind(input.box_type)
            .bind(production_date)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, "barcode_id"))?;
            cartons.push(carton);
        }

        let label_sheet = render_label_sheet(&cartons)?;
        tx.commit().await?;

        tracing::info!(
            product = %input.product_code,
            colour = %colour,
            quantity_per_carton = input.quantity_per_carton,
            labels = barcodes.len(),
            first = barcodes.first().map(String::as_str).unwrap_or(""),
            "Labels generated"
        );

        Ok(LabelBatch {
            barcodes,
            cartons,
            label_sheet,
        })
    }

    /// Label sheet for one existing carton, for reprinting
    pub async fn single_label(&self, barcode: &str) -> AppResult<Vec<u8>> {
        let carton = sqlx::query_as::<_, StockItem>("SELECT * FROM stock_items WHERE barcode_id = $1")
            .bind(barcode)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Barcode {}", barcode)))?;

        render_label_sheet(std::slice::from_ref(&carton))
    }

    /// Put a labelled carton on the shelf
    pub async fn scan_in(&self, barcode: &str, actor: Uuid) -> AppResult<StockItem> {
        let mut tx = self.db.begin().await?;

        let carton = lock_carton_by_barcode(&mut tx, barcode).await?;
        check_scan_in(carton.status)?;

        let updated = sqlx::query_as::<_, StockItem>(
            r#"
            UPDATE stock_items
            SET status = 'in_stock', scanned_in_at = NOW(), scanned_in_by = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(carton.id)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        record_movement(
            &mut tx,
            NewMovement {
                stock_item_id: carton.id,
                movement_type: MovementType::StockIn,
                quantity_change: carton.quantity,
                reason: None,
                order_id: None,
                stocktake_session_id: None,
                performed_by: actor,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            barcode = %updated.barcode_id,
            product = %updated.product_code,
            colour = %updated.colour,
            quantity = updated.quantity,
            "Carton scanned in"
        );

        Ok(updated)
    }

    /// Pick a whole carton, optionally against an order
    pub async fn scan_out(
        &self,
        barcode: &str,
        actor: Uuid,
        order_id: Option<Uuid>,
    ) -> AppResult<StockItem> {
        let mut tx = self.db.begin().await?;

        let carton = lock_carton_by_barcode(&mut tx, barcode).await?;
        check_scan_out(carton.status)?;
        check_order_reference(&mut tx, order_id).await?;

        let updated = sqlx::query_as::<_, StockItem>(
            r#"
            UPDATE stock_items
            SET status = 'picked', scanned_out_at = NOW(), scanned_out_by = $2,
                order_id = COALESCE($3, order_id), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(carton.id)
        .bind(actor)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        record_movement(
            &mut tx,
            NewMovement {
                stock_item_id: carton.id,
                movement_type: MovementType::StockOut,
                quantity_change: -carton.quantity,
                reason: None,
                order_id,
                stocktake_session_id: None,
                performed_by: actor,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            barcode = %updated.barcode_id,
            product = %updated.product_code,
            colour = %updated.colour,
            quantity = updated.quantity,
            order_id = ?order_id,
            "Carton scanned out"
        );

        Ok(updated)
    }

    /// Take some units out of a carton and relabel the remainder
    pub async fn partial_repack(
        &self,
        barcode: &str,
        units_taken: i32,
        actor: Uuid,
        order_id: Option<Uuid>,
    ) -> AppResult<RepackResult> {
        let mut tx = self.db.begin().await?;

        let carton = lock_carton_by_barcode(&mut tx, barcode).await?;
        let plan = plan_partial_repack(carton.status, carton.quantity, units_taken)?;
        check_order_reference(&mut tx, order_id).await?;
        let dates = repack_dates(carton.production_date, Utc::now().date_naive());

        let original = sqlx::query_as::<_, StockItem>(
            r#"
            UPDATE stock_items
            SET status = 'consumed', scanned_out_at = NOW(), scanned_out_by = $2,
                order_id = COALESCE($3, order_id), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(carton.id)
        .bind(actor)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        record_movement(
            &mut tx,
            NewMovement {
                stock_item_id: carton.id,
                movement_type: MovementType::PartialRepack,
                quantity_change: -plan.original_quantity,
                reason: None,
                order_id,
                stocktake_session_id: None,
                performed_by: actor,
            },
        )
        .await?;

        let new_barcode = allocate_barcodes(
            &mut tx,
            &self.barcode_prefix,
            &carton.product_code,
            &carton.colour,
            dates.barcode_date,
            1,
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("barcode allocation returned nothing"))?;

        let new_carton = sqlx::query_as::<_, StockItem>(
            r#"
            INSERT INTO stock_items (
                barcode_id, product_code, colour, quantity, box_type, status, production_date,
                scanned_in_at, scanned_in_by, parent_stock_item_id
            )
            VALUES ($1, $2, $3, $4, 'partial', 'in_stock', $5, NOW(), $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new_barcode)
        .bind(&carton.product_code)
        .bind(&carton.colour)
        .bind(plan.remaining)
        .bind(dates.production_date)
        .bind(actor)
        .bind(carton.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "barcode_id"))?;

        record_movement(
            &mut tx,
            NewMovement {
                stock_item_id: new_carton.id,
                movement_type: MovementType::StockIn,
                quantity_change: plan.remaining,
                reason: None,
                order_id: None,
                stocktake_session_id: None,
                performed_by: actor,
            },
        )
        .await?;

        let label_sheet = render_label_sheet(std::slice::from_ref(&new_carton))?;
        let label_csv = String::from_utf8(label_sheet).map_err(anyhow::Error::from)?;
        tx.commit().await?;

        tracing::info!(
            barcode = %original.barcode_id,
            new_barcode = %new_barcode,
            product = %original.product_code,
            colour = %original.colour,
            taken = plan.units_taken,
            remaining = plan.remaining,
            "Carton partially repacked"
        );

        Ok(RepackResult {
            original,
            new_carton,
            new_barcode,
            units_taken: plan.units_taken,
            units_remaining: plan.remaining,
            label_csv,
        })
    }

    /// Manual quantity correction with a mandatory reason
    pub async fn adjust(
        &self,
        stock_item_id: Uuid,
        quantity_change: i32,
        reason: String,
        actor: Uuid,
    ) -> AppResult<AdjustmentResult> {
        let origin = AdjustmentOrigin::Manual { reason };
        let mut tx = self.db.begin().await?;

        let carton = lock_carton_by_id(&mut tx, stock_item_id).await?;
        let plan = plan_adjustment(carton.status, carton.quantity, quantity_change, &origin)?;
        let result = apply_adjustment(&mut tx, &carton, plan, &origin, actor).await?;

        tx.commit().await?;
        Ok(result)
    }

    /// In-stock totals grouped by product/colour
    pub async fn stock_levels(
        &self,
        product_code: Option<String>,
        colour: Option<String>,
    ) -> AppResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT product_code, colour,
                   COUNT(*) AS carton_count,
                   COALESCE(SUM(quantity), 0)::BIGINT AS total_quantity
            FROM stock_items
            WHERE status = 'in_stock'
              AND ($1::VARCHAR IS NULL OR product_code = $1)
              AND ($2::VARCHAR IS NULL OR colour = $2)
            GROUP BY product_code, colour
            ORDER BY product_code, colour
            "#,
        )
        .bind(blank_to_none(product_code))
        .bind(blank_to_none(colour))
        .fetch_all(&self.db)
        .await?;

        Ok(levels)
    }

    /// Dashboard summary: levels with descriptions and threshold status
    pub async fn stock_summary(&self, filter: SummaryFilter) -> AppResult<StockSummary> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT si.product_code, si.colour,
                   MAX(p.product_description) AS product_description,
                   COUNT(*) AS carton_count,
                   COALESCE(SUM(si.quantity), 0)::BIGINT AS total_quantity
            FROM stock_items si
            LEFT JOIN products p ON p.product_code = si.product_code
            WHERE si.status = 'in_stock'
              AND ($1::TEXT IS NULL OR si.product_code ILIKE $1 OR p.product_description ILIKE $1)
              AND ($2::TEXT IS NULL OR si.colour ILIKE $2)
            GROUP BY si.product_code, si.colour
            ORDER BY si.product_code, si.colour
            "#,
        )
        .bind(like_pattern(filter.search))
        .bind(like_pattern(filter.colour))
        .fetch_all(&self.db)
        .await?;

        let thresholds = self.list_thresholds().await?;

        let mut totals = StockSummaryTotals {
            total_skus: rows.len(),
            total_units: 0,
            total_cartons: 0,
            low_stock_count: 0,
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let threshold = resolve_threshold(&thresholds, &row.product_code, &row.colour);
            let red = threshold.and_then(|t| t.red_threshold);
            let amber = threshold.and_then(|t| t.amber_threshold);
            let status = threshold_status(row.total_quantity, red, amber);

            totals.total_units += row.total_quantity;
            totals.total_cartons += row.carton_count;
            if status.is_some_and(|s| s.is_low()) {
                totals.low_stock_count += 1;
            }

            items.push(StockSummaryItem {
                product_code: row.product_code,
                product_description: row.product_description,
                colour: row.colour,
                carton_count: row.carton_count,
                total_units: row.total_quantity,
                threshold_status: status,
                red_threshold: red,
                amber_threshold: amber,
            });
        }

        if let Some(wanted) = filter.status {
            items.retain(|item| item.threshold_status == Some(wanted));
        }

        Ok(StockSummary {
            summary: totals,
            items,
        })
    }

    /// Cartons matching the filters, newest first
    pub async fn list_items(
        &self,
        filter: ItemFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockItem>> {
        let product_code = blank_to_none(filter.product_code);
        let colour = blank_to_none(filter.colour);
        let search = like_pattern(filter.search);

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM stock_items
            WHERE ($1::VARCHAR IS NULL OR product_code = $1)
              AND ($2::VARCHAR IS NULL OR colour = $2)
              AND ($3::VARCHAR IS NULL OR status = $3)
              AND ($4::TEXT IS NULL OR barcode_id ILIKE $4)
            "#,
        )
        .bind(&product_code)
        .bind(&colour)
        .bind(filter.status)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, StockItem>(
            r#"
            SELECT * FROM stock_items
            WHERE ($1::VARCHAR IS NULL OR product_code = $1)
              AND ($2::VARCHAR IS NULL OR colour = $2)
              AND ($3::VARCHAR IS NULL OR status = $3)
              AND ($4::TEXT IS NULL OR barcode_id ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&product_code)
        .bind(&colour)
        .bind(filter.status)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data,
            pagination: pagination.meta(u64::try_from(total).unwrap_or(0)),
        })
    }

    /// One carton with its movement history
    pub async fn item_detail(&self, stock_item_id: Uuid) -> AppResult<StockItemDetail> {
        let stock_item = sqlx::query_as::<_, StockItem>("SELECT * FROM stock_items WHERE id = $1")
            .bind(stock_item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock item {}", stock_item_id)))?;

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT * FROM stock_movements
            WHERE stock_item_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(stock_item_id)
        .fetch_all(&self.db)
        .await?;

        let product_description = sqlx::query_scalar::<_, Option<String>>(
            "SELECT product_description FROM products WHERE product_code = $1",
        )
        .bind(&stock_item.product_code)
        .fetch_optional(&self.db)
        .await?
        .flatten();

        Ok(StockItemDetail {
            stock_item,
            product_description,
            movements,
        })
    }

    pub async fn list_thresholds(&self) -> AppResult<Vec<StockThreshold>> {
        let thresholds = sqlx::query_as::<_, StockThreshold>(
            "SELECT * FROM stock_thresholds ORDER BY product_code, colour NULLS FIRST",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(thresholds)
    }

    pub async fn create_threshold(&self, input: CreateThresholdInput) -> AppResult<StockThreshold> {
        validate_product_code(&input.product_code).map_err(|e| AppError::Validation {
            field: "product_code".to_string(),
            message: e.message.map(|m| m.to_string()).unwrap_or_default(),
        })?;
        validate_threshold_bounds(input.red_threshold, input.amber_threshold)
            .map_err(threshold_error)?;

        let colour = blank_to_none(input.colour);

        let threshold = sqlx::query_as::<_, StockThreshold>(
            r#"
            INSERT INTO stock_thresholds (product_code, colour, red_threshold, amber_threshold)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&input.product_code)
        .bind(&colour)
        .bind(input.red_threshold)
        .bind(input.amber_threshold)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "threshold"))?;

        tracing::info!(
            product = %threshold.product_code,
            colour = ?threshold.colour,
            red = ?threshold.red_threshold,
            amber = ?threshold.amber_threshold,
            "Threshold created"
        );

        Ok(threshold)
    }

    pub async fn update_threshold(
        &self,
        threshold_id: Uuid,
        input: UpdateThresholdInput,
    ) -> AppResult<StockThreshold> {
        validate_threshold_bounds(input.red_threshold, input.amber_threshold)
            .map_err(threshold_error)?;

        let threshold = sqlx::query_as::<_, StockThreshold>(
            r#"
            UPDATE stock_thresholds
            SET red_threshold = $2, amber_threshold = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(threshold_id)
        .bind(input.red_threshold)
        .bind(input.amber_threshold)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Threshold {}", threshold_id)))?;

        tracing::info!(
            threshold_id = %threshold.id,
            red = ?threshold.red_threshold,
            amber = ?threshold.amber_threshold,
            "Threshold updated"
        );

        Ok(threshold)
    }

    pub async fn delete_threshold(&self, threshold_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM stock_thresholds WHERE id = $1")
            .bind(threshold_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Threshold {}", threshold_id)));
        }

        tracing::info!(threshold_id = %threshold_id, "Threshold deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_filters_are_ignored() {
        assert_eq!(blank_to_none(Some("  ".to_string())), None);
        assert_eq!(blank_to_none(Some(" Black ".to_string())), Some("Black".to_string()));
        assert_eq!(like_pattern(Some("CUP".to_string())), Some("%CUP%".to_string()));
        assert_eq!(like_pattern(None), None);
    }

    #[test]
    fn test_unknown_order_is_not_found() {
        let order_id = Uuid::new_v4();
        assert!(require_known_order(order_id, true).is_ok());

        match require_known_order(order_id, false) {
            Err(AppError::NotFound(what)) => assert_eq!(what, format!("Order {}", order_id)),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_label_input_validation() {
        let input = GenerateLabelsInput {
            product_code: "cup-200".to_string(),
            colour: "Black".to_string(),
            quantity_per_carton: 0,
            number_of_labels: 1,
            box_type: BoxType::Full,
            production_date: None,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("product_code"));
        assert!(fields.contains_key("quantity_per_carton"));
        assert!(!fields.contains_key("number_of_labels"));
    }
}
