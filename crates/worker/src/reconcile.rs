//! Reconciliation Queue Processor
//!
//! Re-applies account updates that a webhook resolved but could not write,
//! and prunes finished queue entries and old processed-event ids.

use serpdeck_billing::{EventLedger, ReconciliationQueue, ReconciliationSweeper, SweepSummary};
use tracing::{error, info, warn};

/// Run one sweep over due reconciliation markers
pub async fn process_reconciliation_queue(sweeper: &ReconciliationSweeper) -> Option<SweepSummary> {
    match sweeper.run_once().await {
        Ok(summary) => {
            if summary.fetched == 0 {
                return Some(summary); // No work to do
            }
            if summary.exhausted > 0 {
                error!(
                    exhausted = summary.exhausted,
                    "Pending account updates permanently failed, manual reconciliation required"
                );
            } else if summary.failed > 0 {
                warn!(
                    failed = summary.failed,
                    applied = summary.applied,
                    "Some pending account updates failed, will retry"
                );
            }
            info!(
                fetched = summary.fetched,
                applied = summary.applied,
                unmatched = summary.unmatched,
                failed = summary.failed,
                "Reconciliation sweep finished"
            );
            Some(summary)
        }
        Err(e) => {
            error!(error = %e, "Failed to sweep reconciliation queue");
            None
        }
    }
}

/// Cleanup old completed/failed markers (for maintenance job)
pub async fn cleanup_old_markers(queue: &dyn ReconciliationQueue, retention_days: i32) {
    match queue.purge_finished(retention_days).await {
        Ok(0) => {}
        Ok(deleted) => {
            info!(
                deleted = deleted,
                retention_days = retention_days,
                "Cleaned up old reconciliation queue entries"
            );
        }
        Err(e) => {
            error!(error = %e, "Failed to cleanup old reconciliation markers");
        }
    }
}

/// Cleanup processed-event ids older than the retention window
pub async fn cleanup_processed_events(ledger: &dyn EventLedger, retention_days: i32) {
    match ledger.purge_processed(retention_days).await {
        Ok(0) => {}
        Ok(deleted) => {
            info!(
                deleted = deleted,
                retention_days = retention_days,
                "Cleaned up old processed webhook events"
            );
        }
        Err(e) => {
            error!(error = %e, "Failed to cleanup processed webhook events");
        }
    }
}
