//! Pending reconciliation markers
//!
//! When an event resolves to an account update but the backend write fails,
//! the update is recorded here before the webhook is answered. The worker
//! sweeps due markers and re-applies them, so a transient backend outage
//! never leaves a paid customer on the free plan.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serpdeck_shared::{Entitlement, Plan, SubscriptionStatus};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::store::{AccountKey, AccountStore, AccountUpdate};

/// Attempts before a marker is left as permanently failed
pub const DEFAULT_MAX_ATTEMPTS: i32 = 10;

/// Markers fetched per sweep
pub const DEFAULT_BATCH_SIZE: i64 = 25;

/// A failed marker is not retried again until this much time has passed
pub const RETRY_COOLDOWN_SECS: i64 = 60;

/// In-sweep retries for a single marker
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// An account update waiting to be re-applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReconciliation {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub key: AccountKey,
    pub update: AccountUpdate,
    /// Attempts made so far, including the one in progress after `fetch_due`
    pub attempts: i32,
    pub max_attempts: i32,
}

impl PendingReconciliation {
    pub fn new(event_id: &str, event_type: &str, key: AccountKey, update: AccountUpdate) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            key,
            update,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Whether a write through `key` reaches the account this marker targets
    pub fn is_addressed_by(&self, key: &AccountKey) -> bool {
        if self.key == *key {
            return true;
        }
        match key {
            AccountKey::CustomerId(id) => self.update.stripe_customer_id.as_deref() == Some(id),
            AccountKey::Email(_) => false,
        }
    }
}

#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    /// Queue a marker. Returns false when the event already has an open
    /// marker, so a redelivery that fails again does not queue a copy.
    async fn enqueue(&self, pending: &PendingReconciliation) -> BillingResult<bool>;

    /// Take up to `limit` due markers, counting an attempt on each
    async fn fetch_due(&self, limit: i64) -> BillingResult<Vec<PendingReconciliation>>;

    async fn mark_completed(&self, id: Uuid) -> BillingResult<()>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> BillingResult<()>;

    /// Retire open markers for `key` after a newer write succeeded, so a
    /// stale marker cannot overwrite fresher state. A customer id key also
    /// retires markers queued under an email that would store that customer
    /// id. Returns how many were retired.
    async fn supersede(&self, key: &AccountKey) -> BillingResult<u64>;

    /// Delete completed and exhausted markers older than `retention_days`
    async fn purge_finished(&self, retention_days: i32) -> BillingResult<u64>;
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
struct Marker {
    pending: PendingReconciliation,
    status: MarkerStatus,
    last_error: Option<String>,
    last_attempt_at: Option<OffsetDateTime>,
    finished_at: Option<OffsetDateTime>,
}

/// Queue kept in process memory. Markers are lost on restart.
#[derive(Default)]
pub struct InMemoryReconciliationQueue {
    markers: Mutex<Vec<Marker>>,
}

impl InMemoryReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markers still waiting to be applied
    pub async fn open(&self) -> Vec<PendingReconciliation> {
        self.markers
            .lock()
            .await
            .iter()
            .filter(|m| m.status != MarkerStatus::Completed && !m.pending.is_exhausted())
            .map(|m| m.pending.clone())
            .collect()
    }

    pub async fn last_error(&self, id: Uuid) -> Option<String> {
        self.markers
            .lock()
            .await
            .iter()
            .find(|m| m.pending.id == id)
            .and_then(|m| m.last_error.clone())
    }

    fn is_open(marker: &Marker) -> bool {
        marker.status != MarkerStatus::Completed && !marker.pending.is_exhausted()
    }

    /// Open, not out of attempts, and not attempted within the cooldown.
    /// A marker fetched by a sweep that died before recording the outcome
    /// becomes due again once the cooldown passes.
    fn is_due(marker: &Marker, now: OffsetDateTime) -> bool {
        Self::is_open(marker)
            && marker.last_attempt_at.map_or(true, |at| {
                now - at >= time::Duration::seconds(RETRY_COOLDOWN_SECS)
            })
    }
}

#[async_trait]
impl ReconciliationQueue for InMemoryReconciliationQueue {
    async fn enqueue(&self, pending: &PendingReconciliation) -> BillingResult<bool> {
        let mut markers = self.markers.lock().await;
        if markers
            .iter()
            .any(|m| Self::is_open(m) && m.pending.event_id == pending.event_id)
        {
            return Ok(false);
        }
        markers.push(Marker {
            pending: pending.clone(),
            status: MarkerStatus::Pending,
            last_error: None,
            last_attempt_at: None,
            finished_at: None,
        });
        Ok(true)
    }

    async fn fetch_due(&self, limit: i64) -> BillingResult<Vec<PendingReconciliation>> {
        let now = OffsetDateTime::now_utc();
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut markers = self.markers.lock().await;
        let mut due = Vec::new();
        for marker in markers.iter_mut() {
            if due.len() >= limit {
                break;
            }
            if Self::is_due(marker, now) {
                marker.pending.attempts += 1;
                marker.last_attempt_at = Some(now);
                due.push(marker.pending.clone());
            }
        }
        Ok(due)
    }

    async fn mark_completed(&self, id: Uuid) -> BillingResult<()> {
        if let Some(marker) = self
            .markers
            .lock()
            .await
            .iter_mut()
            .find(|m| m.pending.id == id)
        {
            marker.status = MarkerStatus::Completed;
            marker.finished_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> BillingResult<()> {
        if let Some(marker) = self
            .markers
            .lock()
            .await
            .iter_mut()
            .find(|m| m.pending.id == id)
        {
            marker.status = MarkerStatus::Failed;
            marker.last_error = Some(error.to_string());
            if marker.pending.is_exhausted() {
                marker.finished_at = Some(OffsetDateTime::now_utc());
            }
        }
        Ok(())
    }

    async fn supersede(&self, key: &AccountKey) -> BillingResult<u64> {
        let mut retired = 0;
        for marker in self
            .markers
            .lock()
            .await
            .iter_mut()
            .filter(|m| m.status != MarkerStatus::Completed && m.pending.is_addressed_by(key))
        {
            marker.status = MarkerStatus::Completed;
            marker.finished_at = Some(OffsetDateTime::now_utc());
            retired += 1;
        }
        Ok(retired)
    }

    async fn purge_finished(&self, retention_days: i32) -> BillingResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(i64::from(retention_days));
        let mut markers = self.markers.lock().await;
        let before = markers.len();
        markers.retain(|m| m.finished_at.map_or(true, |at| at >= cutoff));
        Ok((before - markers.len()) as u64)
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Queue stored in `billing_reconciliation_queue`
#[derive(Clone)]
pub struct PgReconciliationQueue {
    pool: PgPool,
}

impl PgReconciliationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MarkerRow {
    id: Uuid,
    event_id: String,
    event_type: String,
    lookup_column: String,
    lookup_value: String,
    subscription_status: String,
    plan: String,
    credits: i64,
    stripe_customer_id: Option<String>,
    attempts: i32,
    max_attempts: i32,
    created_at: OffsetDateTime,
}

impl TryFrom<MarkerRow> for PendingReconciliation {
    type Error = BillingError;

    fn try_from(row: MarkerRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row
            .subscription_status
            .parse()
            .map_err(|e| BillingError::Internal(format!("marker {}: {e}", row.id)))?;
        let plan: Plan = row
            .plan
            .parse()
            .map_err(|e| BillingError::Internal(format!("marker {}: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            event_id: row.event_id,
            event_type: row.event_type,
            key: AccountKey::from_column(&row.lookup_column, row.lookup_value)?,
            update: AccountUpdate::new(status, Entitlement::new(plan, row.credits))
                .with_customer_id(row.stripe_customer_id),
            attempts: row.attempts,
            max_attempts: row.max_attempts,
        })
    }
}

#[async_trait]
impl ReconciliationQueue for PgReconciliationQueue {
    async fn enqueue(&self, pending: &PendingReconciliation) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_reconciliation_queue
                (id, event_id, event_type, lookup_column, lookup_value,
                 subscription_status, plan, credits, stripe_customer_id, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (event_id)
                WHERE status IN ('pending', 'failed') AND attempts < max_attempts
                DO NOTHING
            "#,
        )
        .bind(pending.id)
        .bind(&pending.event_id)
        .bind(&pending.event_type)
        .bind(pending.key.column())
        .bind(pending.key.value())
        .bind(pending.update.subscription_status.as_str())
        .bind(pending.update.entitlement.plan.as_str())
        .bind(pending.update.entitlement.credits)
        .bind(&pending.update.stripe_customer_id)
        .bind(pending.max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_due(&self, limit: i64) -> BillingResult<Vec<PendingReconciliation>> {
        let rows: Vec<MarkerRow> = sqlx::query_as(
            r#"
            UPDATE billing_reconciliation_queue
            SET attempts = attempts + 1, last_attempt_at = NOW()
            WHERE id IN (
                SELECT id FROM billing_reconciliation_queue
                WHERE status IN ('pending', 'failed')
                  AND attempts < max_attempts
                  AND (last_attempt_at IS NULL
                       OR last_attempt_at < NOW() - ($2 || ' seconds')::INTERVAL)
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_id, event_type, lookup_column, lookup_value,
                      subscription_status, plan, credits, stripe_customer_id,
                      attempts, max_attempts, created_at
            "#,
        )
        .bind(limit)
        .bind(RETRY_COOLDOWN_SECS.to_string())
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order
        let mut rows = rows;
        rows.sort_by_key(|row| row.created_at);
        rows.into_iter()
            .map(PendingReconciliation::try_from)
            .collect()
    }

    async fn mark_completed(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE billing_reconciliation_queue SET status = 'completed', processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE billing_reconciliation_queue
            SET status = 'failed',
                last_error = $1,
                processed_at = CASE WHEN attempts >= max_attempts THEN NOW() ELSE NULL END
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn supersede(&self, key: &AccountKey) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE billing_reconciliation_queue
            SET status = 'completed', processed_at = NOW(), last_error = 'superseded'
            WHERE status IN ('pending', 'failed')
              AND ((lookup_column = $1 AND lookup_value = $2)
                   OR ($1 = 'stripe_customer_id' AND stripe_customer_id = $2))
            "#,
        )
        .bind(key.column())
        .bind(key.value())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_finished(&self, retention_days: i32) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM billing_reconciliation_queue
            WHERE processed_at < NOW() - ($1 || ' days')::INTERVAL
              AND status IN ('completed', 'failed')
            "#,
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Outcome counts of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub fetched: usize,
    pub applied: usize,
    /// Applied but matched no account
    pub unmatched: usize,
    pub failed: usize,
    /// Failed and out of attempts
    pub exhausted: usize,
}

/// Re-applies due markers against the account store
pub struct ReconciliationSweeper {
    store: Arc<dyn AccountStore>,
    queue: Arc<dyn ReconciliationQueue>,
    batch_size: i64,
}

impl ReconciliationSweeper {
    pub fn new(store: Arc<dyn AccountStore>, queue: Arc<dyn ReconciliationQueue>) -> Self {
        Self {
            store,
            queue,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Apply an update, retrying transient backend errors with backoff
    async fn apply_with_retry(&self, pending: &PendingReconciliation) -> BillingResult<u64> {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.store.apply_update(&pending.key, &pending.update).await;
            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(marker_id = %pending.id, error = %e, "Transient error - will retry");
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    /// Run one pass over the due markers
    pub async fn run_once(&self) -> BillingResult<SweepSummary> {
        let due = self.queue.fetch_due(self.batch_size).await?;
        let mut summary = SweepSummary {
            fetched: due.len(),
            ..SweepSummary::default()
        };

        if due.is_empty() {
            return Ok(summary);
        }

        tracing::info!(count = due.len(), "Re-applying pending account updates");

        for pending in due {
            match self.apply_with_retry(&pending).await {
                Ok(rows) => {
                    if rows == 0 {
                        tracing::warn!(
                            marker_id = %pending.id,
                            event_id = %pending.event_id,
                            key = %pending.key,
                            "Pending update matched no account"
                        );
                        summary.unmatched += 1;
                    } else {
                        tracing::info!(
                            marker_id = %pending.id,
                            event_id = %pending.event_id,
                            key = %pending.key,
                            plan = %pending.update.entitlement.plan,
                            attempts = pending.attempts,
                            "Pending update applied"
                        );
                    }
                    self.queue.mark_completed(pending.id).await?;
                    summary.applied += 1;
                }
                Err(e) => {
                    self.queue.mark_failed(pending.id, &e.to_string()).await?;
                    summary.failed += 1;
                    if pending.is_exhausted() {
                        summary.exhausted += 1;
                        tracing::error!(
                            marker_id = %pending.id,
                            event_id = %pending.event_id,
                            key = %pending.key,
                            attempts = pending.attempts,
                            error = %e,
                            "Pending update permanently failed after max attempts"
                        );
                    } else {
                        tracing::warn!(
                            marker_id = %pending.id,
                            event_id = %pending.event_id,
                            attempts = pending.attempts,
                            max_attempts = pending.max_attempts,
                            error = %e,
                            "Pending update failed, will retry"
                        );
                    }
                }
            }
        }

        Ok(summary)
    }
}
