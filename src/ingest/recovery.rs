//! Failure recovery jobs
//!
//! `retry_failed` hands `FAILED` rows back to the pipeline by re-marking them
//! `PENDING`; `reconcile` flags `PENDING` rows abandoned by a crashed worker as
//! `FAILED` so the next retry pass picks them up.

use std::sync::Arc;

use chrono::Duration;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::models::DeadLetterEntry;
use crate::models::IndexStatistics;
use crate::tracking::TrackingStore;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    /// Candidates selected
    pub total: usize,
    /// Re-marked `PENDING`
    pub retried: usize,
    /// Could not be re-marked
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub total: usize,
    /// Stale rows moved to `FAILED`
    pub requeued: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct RecoveryJobs {
    tracking: Arc<dyn TrackingStore>,
}

impl RecoveryJobs {
    pub fn new(tracking: Arc<dyn TrackingStore>) -> Self {
        Self { tracking }
    }

    /// Requeue up to `limit` failed rows that have been retried fewer than
    /// `max_retries` times, oldest first
    pub async fn retry_failed(&self, max_retries: i32, limit: i64) -> Result<RetryReport> {
        let candidates = self
            .tracking
            .list_failed_for_retry(max_retries, limit)
            .await?;
        let mut report = RetryReport {
            total: candidates.len(),
            ..RetryReport::default()
        };

        for doc in candidates {
            match self.tracking.requeue(doc.id).await {
                Ok(true) => report.retried += 1,
                Ok(false) => {
                    // Someone else moved it meanwhile
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Failed to requeue {}: {}", doc.analytics_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Retry pass: {} candidates, {} requeued, {} failed",
            report.total, report.retried, report.failed
        );
        Ok(report)
    }

    /// Flag rows stuck in `PENDING` for longer than `stale_after`
    pub async fn reconcile(&self, stale_after: Duration, limit: i64) -> Result<ReconcileReport> {
        let cutoff = Utc::now() - stale_after;
        let stale = self.tracking.list_stale_pending(cutoff, limit).await?;
        let mut report = ReconcileReport {
            total: stale.len(),
            ..ReconcileReport::default()
        };

        let message = format!(
            "reconciled: pending for more than {} minutes",
            stale_after.num_minutes()
        );
        for doc in stale {
            match self.tracking.mark_stale(doc.id, &message).await {
                Ok(true) => report.requeued += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("Failed to reconcile {}: {}", doc.analytics_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Reconcile pass: {} stale, {} requeued, {} failed",
            report.total, report.requeued, report.failed
        );
        Ok(report)
    }

    pub async fn statistics(&self, project_id: Option<&str>) -> Result<IndexStatistics> {
        self.tracking.statistics(project_id).await
    }

    pub async fn dead_letters(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeadLetterEntry>> {
        self.tracking.list_dead_letters(project_id, limit).await
    }
}
