#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SerpDeck Worker
//!
//! Background jobs: re-applies account updates queued by failed webhook
//! writes, and prunes finished reconciliation entries and processed-event ids.

mod reconcile;

use std::sync::Arc;
use std::time::Duration;

use serpdeck_api::{build_billing_service, telemetry, Config};
use tokio_cron_scheduler::{Job, JobScheduler};

/// Finished queue entries are kept this long for auditing
const MARKER_RETENTION_DAYS: i32 = 30;

/// Processed event ids are kept well past Stripe's three-day redelivery window
const EVENT_RETENTION_DAYS: i32 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_tracing("info,serpdeck_worker=debug,serpdeck_billing=debug");

    tracing::info!("Starting SerpDeck Worker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if config.database_url.is_none() {
        tracing::warn!(
            "DATABASE_URL not set; the worker only sees its own in-memory queue and has nothing to sweep"
        );
    }

    let billing = build_billing_service(&config).await?;
    let sweeper = Arc::new(billing.sweeper().with_batch_size(config.reconcile_batch_size));
    let queue = billing.backends().queue.clone();
    let ledger = billing.backends().ledger.clone();

    let mut scheduler = JobScheduler::new().await?;

    let sweep_interval = Duration::from_secs(config.reconcile_interval_secs.max(1));
    scheduler
        .add(Job::new_repeated_async(sweep_interval, move |_id, _scheduler| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                reconcile::process_reconciliation_queue(&sweeper).await;
            })
        })?)
        .await?;

    // Daily at 03:00 UTC
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_id, _scheduler| {
            let queue = queue.clone();
            let ledger = ledger.clone();
            Box::pin(async move {
                reconcile::cleanup_old_markers(queue.as_ref(), MARKER_RETENTION_DAYS).await;
                reconcile::cleanup_processed_events(ledger.as_ref(), EVENT_RETENTION_DAYS).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        batch_size = config.reconcile_batch_size,
        "Reconciliation sweep scheduled"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    scheduler.shutdown().await?;

    Ok(())
}
