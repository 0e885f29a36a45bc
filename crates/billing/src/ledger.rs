//! Processed-event ledger
//!
//! Stripe delivers events at least once. Before an event is applied its id is
//! claimed here; a second delivery of a claimed id is acknowledged without
//! touching accounts. A failed apply releases the claim so the provider's
//! retry can run it again.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::error::BillingResult;

/// A claim left in `processing` longer than this is treated as abandoned
/// (process crashed mid-apply) and may be taken over.
pub const STUCK_CLAIM_MINUTES: i64 = 30;

/// Result of trying to claim an event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller owns the event and must complete or release it
    Acquired,
    /// Another delivery is applying the event right now
    InProgress,
    /// The event was already applied
    AlreadyProcessed,
}

#[async_trait]
pub trait EventLedger: Send + Sync {
    async fn claim(&self, event_id: &str, event_type: &str) -> BillingResult<Claim>;

    /// Mark a claimed event as applied
    async fn complete(&self, event_id: &str) -> BillingResult<()>;

    /// Drop a claim after a failed apply
    async fn release(&self, event_id: &str) -> BillingResult<()>;

    /// Delete processed entries claimed more than `retention_days` ago.
    /// Stripe stops redelivering an event after three days.
    async fn purge_processed(&self, retention_days: i32) -> BillingResult<u64>;
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Processing(OffsetDateTime),
    Processed(OffsetDateTime),
}

/// Ledger kept in process memory. Claims do not survive a restart.
#[derive(Default)]
pub struct InMemoryEventLedger {
    entries: Mutex<HashMap<String, EntryState>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_processed(&self, event_id: &str) -> bool {
        matches!(
            self.entries.lock().await.get(event_id),
            Some(EntryState::Processed(_))
        )
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn claim(&self, event_id: &str, _event_type: &str) -> BillingResult<Claim> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.lock().await;
        let claim = match entries.get(event_id) {
            Some(EntryState::Processed(_)) => Claim::AlreadyProcessed,
            Some(EntryState::Processing(since))
                if now - *since < Duration::minutes(STUCK_CLAIM_MINUTES) =>
            {
                Claim::InProgress
            }
            _ => {
                entries.insert(event_id.to_string(), EntryState::Processing(now));
                Claim::Acquired
            }
        };
        Ok(claim)
    }

    async fn complete(&self, event_id: &str) -> BillingResult<()> {
        self.entries.lock().await.insert(
            event_id.to_string(),
            EntryState::Processed(OffsetDateTime::now_utc()),
        );
        Ok(())
    }

    async fn release(&self, event_id: &str) -> BillingResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(EntryState::Processing(_)) = entries.get(event_id) {
            entries.remove(event_id);
        }
        Ok(())
    }

    async fn purge_processed(&self, retention_days: i32) -> BillingResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - Duration::days(i64::from(retention_days));
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, state| !matches!(state, EntryState::Processed(at) if *at < cutoff));
        Ok((before - entries.len()) as u64)
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Ledger stored in `billing_event_ledger`
#[derive(Clone)]
pub struct PgEventLedger {
    pool: PgPool,
}

impl PgEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLedger for PgEventLedger {
    async fn claim(&self, event_id: &str, event_type: &str) -> BillingResult<Claim> {
        // Only one concurrent delivery gets a row back. A stale 'processing'
        // row is taken over; a 'processed' row never is.
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO billing_event_ledger (event_id, event_type, status, claimed_at)
            VALUES ($1, $2, 'processing', NOW())
            ON CONFLICT (event_id) DO UPDATE SET
                status = 'processing',
                claimed_at = NOW()
            WHERE billing_event_ledger.status = 'processing'
              AND billing_event_ledger.claimed_at < NOW() - ($3 || ' minutes')::INTERVAL
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(STUCK_CLAIM_MINUTES.to_string())
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(Claim::Acquired);
        }

        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM billing_event_ledger WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match status {
            Some((status,)) if status == "processed" => Claim::AlreadyProcessed,
            Some(_) => Claim::InProgress,
            // Released between the insert and the select; let the provider retry
            None => Claim::InProgress,
        })
    }

    async fn complete(&self, event_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE billing_event_ledger
            SET status = 'processed', processed_at = NOW()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, event_id: &str) -> BillingResult<()> {
        sqlx::query("DELETE FROM billing_event_ledger WHERE event_id = $1 AND status = 'processing'")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_processed(&self, retention_days: i32) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM billing_event_ledger
            WHERE status = 'processed'
              AND claimed_at < NOW() - ($1 || ' days')::INTERVAL
            "#,
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
