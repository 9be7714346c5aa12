//! Inbox ingestion and the background monitor
//!
//! Emails land in `incoming_emails` through the ingestion endpoint. The
//! monitor drains unprocessed rows through the extraction client and turns
//! each one into an order. The monitor is a handle owned by the server state;
//! clones share the same task and status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Pagination, PaginatedResponse};
use sqlx::{FromRow, PgPool};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};
use crate::external::{ExtractionClient, ExtractionRequest};
use crate::services::order::OrderService;

/// Stored purchase-order email
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IncomingEmail {
    pub id: Uuid,
    pub message_id: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct IngestEmailInput {
    #[validate(length(min = 1, max = 255))]
    pub message_id: String,
    #[validate(length(max = 255))]
    pub sender: Option<String>,
    pub subject: Option<String>,
    #[validate(length(min = 1))]
    pub body_text: String,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailFilter {
    pub processed: Option<bool>,
}

/// Counts from one pass over the unprocessed emails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub orders_created: u64,
    pub errors: u64,
    pub message: String,
}

impl ProcessSummary {
    pub fn new(orders_created: u64, errors: u64) -> Self {
        let message = format!(
            "Processed {} emails: {} orders created, {} errors",
            orders_created + errors,
            orders_created,
            errors
        );
        Self {
            orders_created,
            errors,
            message,
        }
    }

    pub fn emails_processed(&self) -> u64 {
        self.orders_created + self.errors
    }
}

/// One pass of email processing
#[axum::async_trait]
pub trait EmailProcessor: Send + Sync {
    async fn process_pending(&self) -> AppResult<ProcessSummary>;
}

/// Email storage
#[derive(Clone)]
pub struct InboxService {
    db: PgPool,
}

impl InboxService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Store a received email for processing
    pub async fn ingest(&self, input: IngestEmailInput) -> AppResult<IncomingEmail> {
        input.validate()?;

        let email = sqlx::query_as::<_, IncomingEmail>(
            r#"
            INSERT INTO incoming_emails (message_id, sender, subject, body_text, received_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            RETURNING *
            "#,
        )
        .bind(input.message_id.trim())
        .bind(&input.sender)
        .bind(&input.subject)
        .bind(&input.body_text)
        .bind(input.received_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "message_id"))?;

        tracing::info!(
            email_id = %email.id,
            message_id = %email.message_id,
            sender = ?email.sender,
            "Email ingested"
        );

        Ok(email)
    }

    /// Emails, newest first
    pub async fn list(
        &self,
        filter: EmailFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<IncomingEmail>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM incoming_emails WHERE ($1::BOOLEAN IS NULL OR processed = $1)",
        )
        .bind(filter.processed)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, IncomingEmail>(
            r#"
            SELECT * FROM incoming_emails
            WHERE ($1::BOOLEAN IS NULL OR processed = $1)
            ORDER BY received_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.processed)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data,
            pagination: pagination.meta(u64::try_from(total).unwrap_or(0)),
        })
    }

    /// Unprocessed emails in arrival order
    pub async fn unprocessed(&self) -> AppResult<Vec<IncomingEmail>> {
        let emails = sqlx::query_as::<_, IncomingEmail>(
            "SELECT * FROM incoming_emails WHERE NOT processed ORDER BY received_at",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(emails)
    }
}

/// Processor backed by the database and the extraction service
pub struct DbEmailProcessor {
    inbox: InboxService,
    orders: OrderService,
    extraction: Option<ExtractionClient>,
}

impl DbEmailProcessor {
    pub fn new(inbox: InboxService, orders: OrderService, extraction: Option<ExtractionClient>) -> Self {
        Self {
            inbox,
            orders,
            extraction,
        }
    }
}

#[axum::async_trait]
impl EmailProcessor for DbEmailProcessor {
    async fn process_pending(&self) -> AppResult<ProcessSummary> {
        let client = self
            .extraction
            .as_ref()
            .ok_or_else(|| AppError::Extraction("Extraction endpoint not configured".to_string()))?;

        let emails = self.inbox.unprocessed().await?;
        if emails.is_empty() {
            return Ok(ProcessSummary::new(0, 0));
        }

        let mut created = 0;
        let mut errors = 0;

        for email in emails {
            let request = ExtractionRequest {
                message_id: email.message_id.clone(),
                sender: email.sender.clone(),
                subject: email.subject.clone(),
                body_text: email.body_text.clone().unwrap_or_default(),
            };

            let result = match client.extract(&request).await {
                Ok(extracted) => self.orders.create_from_extraction(Some(email.id), &extracted).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(_) => created += 1,
                Err(e) => {
                    tracing::warn!(
                        email_id = %email.id,
                        message_id = %email.message_id,
                        error = %e,
                        "Email extraction failed"
                    );
                    self.orders
                        .create_error_order(email.id, email.sender.as_deref(), &e.to_string())
                        .await?;
                    errors += 1;
                }
            }
        }

        let summary = ProcessSummary::new(created, errors);
        tracing::info!(
            orders_created = summary.orders_created,
            errors = summary.errors,
            "Inbox batch processed"
        );
        Ok(summary)
    }
}

/// Next wait after a poll: back to the interval on success, doubled and
/// capped on failure.
pub fn next_backoff(current: Duration, poll_interval: Duration, max_backoff: Duration, ok: bool) -> Duration {
    if ok {
        poll_interval
    } else {
        (current * 2).min(max_backoff.max(poll_interval))
    }
}

/// Snapshot of the monitor
#[derive(Debug, Clone, Default, Serialize)]
pub struct InboxStatus {
    pub is_running: bool,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub emails_processed_total: u64,
    pub poll_interval_secs: u64,
}

struct RunningTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct MonitorInner {
    processor: Arc<dyn EmailProcessor>,
    poll_interval: Duration,
    max_backoff: Duration,
    status: Mutex<InboxStatus>,
    task: Mutex<Option<RunningTask>>,
}

/// Handle to the background inbox poller
#[derive(Clone)]
pub struct InboxMonitor {
    inner: Arc<MonitorInner>,
}

impl InboxMonitor {
    pub fn new(processor: Arc<dyn EmailProcessor>, poll_interval: Duration, max_backoff: Duration) -> Self {
        let status = InboxStatus {
            poll_interval_secs: poll_interval.as_secs(),
            ..InboxStatus::default()
        };

        Self {
            inner: Arc::new(MonitorInner {
                processor,
                poll_interval,
                max_backoff,
                status: Mutex::new(status),
                task: Mutex::new(None),
            }),
        }
    }

    pub async fn status(&self) -> InboxStatus {
        self.inner.status.lock().await.clone()
    }

    /// Start the background loop. Returns false when already running.
    pub async fn start(&self) -> bool {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let monitor = self.clone();
        let handle = tokio::spawn(async move { monitor.run(stop_rx).await });
        *task = Some(RunningTask { stop, handle });

        self.inner.status.lock().await.is_running = true;
        tracing::info!(
            poll_interval_secs = self.inner.poll_interval.as_secs(),
            "Inbox monitor started"
        );
        true
    }

    /// Signal the loop to stop and wait for it. Returns false when not running.
    pub async fn stop(&self) -> bool {
        let running = self.inner.task.lock().await.take();
        let Some(running) = running else {
            return false;
        };

        let _ = running.stop.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Inbox monitor task ended abnormally");
        }

        self.inner.status.lock().await.is_running = false;
        tracing::info!("Inbox monitor stopped");
        true
    }

    /// Run one processing pass and record the outcome
    pub async fn poll_once(&self) -> AppResult<ProcessSummary> {
        let result = self.inner.processor.process_pending().await;

        let mut status = self.inner.status.lock().await;
        status.last_poll_at = Some(Utc::now());
        match &result {
            Ok(summary) => {
                status.last_error = None;
                status.emails_processed_total += summary.emails_processed();
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
            }
        }

        result
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let poll_interval = self.inner.poll_interval;
        let mut wait = poll_interval;

        loop {
            let ok = match self.poll_once().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!(error = %e, "Inbox poll failed");
                    false
                }
            };
            wait = next_backoff(wait, poll_interval, self.inner.max_backoff, ok);
            if !ok {
                tracing::debug!(wait_secs = wait.as_secs(), "Backing off inbox poll");
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
