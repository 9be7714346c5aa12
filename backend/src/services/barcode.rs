//! Barcode allocation
//!
//! Sequence lookup and allocation run inside the caller's transaction behind
//! a transaction-scoped advisory lock on the prefix, so concurrent label
//! requests for the same product/colour/day queue up instead of reading the
//! same maximum.

use chrono::NaiveDate;
use shared::{barcode_prefix, escape_like, max_sequence, sequence_barcodes};
use sqlx::PgConnection;

use crate::error::AppResult;

/// Allocate `count` new barcodes for a product/colour/production date
pub async fn allocate_barcodes(
    conn: &mut PgConnection,
    prefix: &str,
    product_code: &str,
    colour: &str,
    production_date: NaiveDate,
    count: u32,
) -> AppResult<Vec<String>> {
    let day_prefix = barcode_prefix(prefix, product_code, colour, production_date);

    // released on commit or rollback
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&day_prefix)
        .execute(&mut *conn)
        .await?;

    let existing = sqlx::query_scalar::<_, String>(
        r#"
        SELECT barcode_id FROM stock_items
        WHERE barcode_id LIKE $1 ESCAPE '\'
        "#,
    )
    .bind(format!("{}%", escape_like(&day_prefix)))
    .fetch_all(&mut *conn)
    .await?;

    let current_max = max_sequence(existing.iter().map(String::as_str), &day_prefix);
    let barcodes = sequence_barcodes(&day_prefix, current_max, count);

    tracing::debug!(
        prefix = %day_prefix,
        from = current_max + 1,
        count,
        "Allocated barcode sequence"
    );

    Ok(barcodes)
}
