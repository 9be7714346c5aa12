//! Stocktake sessions
//!
//! A session snapshots the in-stock carton count, records every scan, and
//! on completion reconciles what was found against what is on the books.
//! Scans and completion hold the session row lock.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    classify_scan, missing_barcodes, plan_write_off, require_in_progress, total_discrepancies,
    AdjustmentOrigin, CartonStatus, MovementType, ScanResult, SessionProgress, StockItem,
    StocktakeError, StocktakeScan, StocktakeSession, StocktakeStatus,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::stock::{apply_adjustment, record_movement, NewMovement};

/// Stocktake service
#[derive(Clone)]
pub struct StocktakeService {
    db: PgPool,
}

/// Recorded scan plus where the session now stands
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub scan: StocktakeScan,
    pub progress: SessionProgress,
}

/// Completed session and what reconciliation did
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub session: StocktakeSession,
    pub missing: usize,
    pub unexpected: usize,
    /// Cartons written off because they were not found
    pub adjusted: usize,
}

/// In-stock carton no `found` scan covered
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MissingCarton {
    pub stock_item_id: Uuid,
    pub barcode_id: String,
    pub product_code: String,
    pub colour: String,
    /// Quantity on the books when it went missing
    pub quantity: i32,
    pub last_movement: Option<MovementType>,
    pub last_movement_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscrepancySummary {
    pub missing_count: usize,
    pub unexpected_count: usize,
    pub total_discrepancies: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscrepancyReport {
    pub session: StocktakeSession,
    pub missing: Vec<MissingCarton>,
    pub unexpected: Vec<StocktakeScan>,
    pub summary: DiscrepancySummary,
}

async fn lock_session(conn: &mut PgConnection, session_id: Uuid) -> AppResult<StocktakeSession> {
    sqlx::query_as::<_, StocktakeSession>(
        "SELECT * FROM stocktake_sessions WHERE id = $1 FOR UPDATE",
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Stocktake session {}", session_id)))
}

async fn found_barcodes(conn: &mut PgConnection, session_id: Uuid) -> AppResult<Vec<String>> {
    let barcodes = sqlx::query_scalar::<_, String>(
        r#"
        SELECT barcode_scanned FROM stocktake_scans
        WHERE session_id = $1 AND scan_result = 'found'
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(barcodes)
}

impl StocktakeService {
    /// Create a new StocktakeService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a session and snapshot the expected carton count
    pub async fn start(&self, name: &str, notes: Option<String>, actor: Uuid) -> AppResult<StocktakeSession> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StocktakeError::NameRequired.into());
        }

        let mut tx = self.db.begin().await?;

        let expected = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_items WHERE status = 'in_stock'",
        )
        .fetch_one(&mut *tx)
        .await?;

        let session = sqlx::query_as::<_, StocktakeSession>(
            r#"
            INSERT INTO stocktake_sessions (name, status, started_by, total_expected, notes)
            VALUES ($1, 'in_progress', $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(actor)
        .bind(i32::try_from(expected).unwrap_or(i32::MAX))
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            session_id = %session.id,
            name = %session.name,
            expected = session.total_expected,
            "Stocktake started"
        );

        Ok(session)
    }

    /// Record one scan; only `found` moves the progress counter
    pub async fn scan(
        &self,
        session_id: Uuid,
        barcode: &str,
        notes: Option<String>,
        actor: Uuid,
    ) -> AppResult<ScanOutcome> {
        let mut tx = self.db.begin().await?;

        let session = lock_session(&mut tx, session_id).await?;
        require_in_progress(session.status)?;

        let carton = sqlx::query_as::<_, (Uuid, CartonStatus)>(
            "SELECT id, status FROM stock_items WHERE barcode_id = $1",
        )
        .bind(barcode)
        .fetch_optional(&mut *tx)
        .await?;

        let already_scanned = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stocktake_scans WHERE session_id = $1 AND barcode_scanned = $2
            )
            "#,
        )
        .bind(session_id)
        .bind(barcode)
        .fetch_one(&mut *tx)
        .await?;

        let result = classify_scan(already_scanned, carton.map(|(_, status)| status));
        let stock_item_id = carton.map(|(id, _)| id);

        let scan = sqlx::query_as::<_, StocktakeScan>(
            r#"
            INSERT INTO stocktake_scans (session_id, barcode_scanned, stock_item_id, scan_result, scanned_by, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(barcode)
        .bind(stock_item_id)
        .bind(result)
        .bind(actor)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        let mut total_scanned = session.total_scanned;
        if result == ScanResult::Found {
            total_scanned = sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE stocktake_sessions
                SET total_scanned = total_scanned + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING total_scanned
                "#,
            )
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;

            if let Some(stock_item_id) = stock_item_id {
                record_movement(
                    &mut tx,
                    NewMovement {
                        stock_item_id,
                        movement_type: MovementType::StocktakeVerified,
                        quantity_change: 0,
                        reason: None,
                        order_id: None,
                        stocktake_session_id: Some(session_id),
                        performed_by: actor,
                    },
                )
                .await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            session_id = %session_id,
            barcode = %barcode,
            result = result.as_str(),
            "Stocktake scan recorded"
        );

        Ok(ScanOutcome {
            scan,
            progress: SessionProgress::new(session.total_expected, total_scanned),
        })
    }

    pub async fn progress(&self, session_id: Uuid) -> AppResult<SessionProgress> {
        Ok(self.get(session_id).await?.progress())
    }

    /// Close the session, counting discrepancies and optionally writing off
    /// every carton that was not found.
    pub async fn complete(
        &self,
        session_id: Uuid,
        auto_adjust: bool,
        actor: Uuid,
    ) -> AppResult<CompletionReport> {
        let mut tx = self.db.begin().await?;

        let session = lock_session(&mut tx, session_id).await?;
        require_in_progress(session.status)?;

        let found = found_barcodes(&mut tx, session_id).await?;
        let found: HashSet<&str> = found.iter().map(String::as_str).collect();

        let in_stock = sqlx::query_as::<_, StockItem>(
            "SELECT * FROM stock_items WHERE status = 'in_stock' ORDER BY barcode_id FOR UPDATE",
        )
        .fetch_all(&mut *tx)
        .await?;

        let missing: HashSet<&str> =
            missing_barcodes(in_stock.iter().map(|c| c.barcode_id.as_str()), &found)
                .into_iter()
                .collect();

        let unexpected = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM stocktake_scans
            WHERE session_id = $1 AND scan_result = ANY($2)
            "#,
        )
        .bind(session_id)
        .bind(ScanResult::unexpected_names())
        .fetch_one(&mut *tx)
        .await?;
        let unexpected = usize::try_from(unexpected).unwrap_or(0);

        let mut adjusted = 0;
        if auto_adjust {
            let origin = AdjustmentOrigin::Stocktake {
                session_id,
                session_name: session.name.clone(),
            };
            for carton in in_stock.iter().filter(|c| missing.contains(c.barcode_id.as_str())) {
                let plan = plan_write_off(carton.status, carton.quantity, &origin)?;
                apply_adjustment(&mut tx, carton, plan, &origin, actor).await?;
                adjusted += 1;
            }
        }

        let discrepancies = total_discrepancies(missing.len(), unexpected);
        let session = sqlx::query_as::<_, StocktakeSession>(
            r#"
            UPDATE stocktake_sessions
            SET status = 'completed', completed_by = $2, completed_at = NOW(),
                total_discrepancies = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(actor)
        .bind(discrepancies)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            session_id = %session_id,
            name = %session.name,
            missing = missing.len(),
            unexpected,
            discrepancies,
            auto_adjust,
            adjusted,
            "Stocktake completed"
        );

        Ok(CompletionReport {
            session,
            missing: missing.len(),
            unexpected,
            adjusted,
        })
    }

    /// Abandon a session without reconciling anything
    pub async fn cancel(&self, session_id: Uuid, actor: Uuid) -> AppResult<StocktakeSession> {
        let mut tx = self.db.begin().await?;

        let session = lock_session(&mut tx, session_id).await?;
        require_in_progress(session.status)?;

        let session = sqlx::query_as::<_, StocktakeSession>(
            r#"
            UPDATE stocktake_sessions
            SET status = 'cancelled', completed_by = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(session_id = %session_id, name = %session.name, "Stocktake cancelled");
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> AppResult<StocktakeSession> {
        sqlx::query_as::<_, StocktakeSession>("SELECT * FROM stocktake_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stocktake session {}", session_id)))
    }

    /// Sessions, newest first
    pub async fn list(&self) -> AppResult<Vec<StocktakeSession>> {
        let sessions = sqlx::query_as::<_, StocktakeSession>(
            "SELECT * FROM stocktake_sessions ORDER BY started_at DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }

    /// Every scan of a session, newest first
    pub async fn scans(&self, session_id: Uuid) -> AppResult<Vec<StocktakeScan>> {
        self.get(session_id).await?;

        let scans = sqlx::query_as::<_, StocktakeScan>(
            "SELECT * FROM stocktake_scans WHERE session_id = $1 ORDER BY scanned_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        Ok(scans)
    }

    /// Missing cartons and unexpected scans.
    ///
    /// For a completed session the cartons it wrote off are listed with the
    /// quantity they had, alongside any that are still in stock unfound.
    pub async fn discrepancies(&self, session_id: Uuid) -> AppResult<DiscrepancyReport> {
        let session = self.get(session_id).await?;

        let mut missing = Vec::new();
        if session.status == StocktakeStatus::Completed {
            missing = sqlx::query_as::<_, MissingCarton>(
                r#"
                SELECT si.id AS stock_item_id, si.barcode_id, si.product_code, si.colour,
                       -m.quantity_change AS quantity,
                       lm.movement_type AS last_movement, lm.created_at AS last_movement_at
                FROM stock_movements m
                JOIN stock_items si ON si.id = m.stock_item_id
                LEFT JOIN LATERAL (
                    SELECT movement_type, created_at FROM stock_movements
                    WHERE stock_item_id = si.id AND stocktake_session_id IS DISTINCT FROM $1
                    ORDER BY created_at DESC
                    LIMIT 1
                ) lm ON TRUE
                WHERE m.stocktake_session_id = $1 AND m.movement_type = 'adjustment'
                ORDER BY si.product_code, si.colour, si.barcode_id
                "#,
            )
            .bind(session_id)
            .fetch_all(&self.db)
            .await?;
        }

        let still_missing = sqlx::query_as::<_, MissingCarton>(
            r#"
            SELECT si.id AS stock_item_id, si.barcode_id, si.product_code, si.colour, si.quantity,
                   lm.movement_type AS last_movement, lm.created_at AS last_movement_at
            FROM stock_items si
            LEFT JOIN LATERAL (
                SELECT movement_type, created_at FROM stock_movements
                WHERE stock_item_id = si.id AND stocktake_session_id IS DISTINCT FROM $1
                ORDER BY created_at DESC
                LIMIT 1
            ) lm ON TRUE
            WHERE si.status = 'in_stock'
              AND NOT EXISTS (
                  SELECT 1 FROM stocktake_scans s
                  WHERE s.session_id = $1 AND s.scan_result = 'found'
                    AND s.barcode_scanned = si.barcode_id
              )
            ORDER BY si.product_code, si.colour, si.barcode_id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        let seen: HashSet<Uuid> = missing.iter().map(|m| m.stock_item_id).collect();
        missing.extend(still_missing.into_iter().filter(|m| !seen.contains(&m.stock_item_id)));

        let unexpected = sqlx::query_as::<_, StocktakeScan>(
            r#"
            SELECT * FROM stocktake_scans
            WHERE session_id = $1 AND scan_result = ANY($2)
            ORDER BY scanned_at DESC
            "#,
        )
        .bind(session_id)
        .bind(ScanResult::unexpected_names())
        .fetch_all(&self.db)
        .await?;

        let summary = DiscrepancySummary {
            missing_count: missing.len(),
            unexpected_count: unexpected.len(),
            total_discrepancies: total_discrepancies(missing.len(), unexpected.len()),
        };

        Ok(DiscrepancyReport {
            session,
            missing,
            unexpected,
            summary,
        })
    }
}
