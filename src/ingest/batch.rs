//! Batch orchestration
//!
//! One batch file fans out into one task per record. A semaphore caps how many
//! records are in flight; each task returns its own outcome and the summary is
//! reduced when tasks are joined. A record's failure, or panic, never touches
//! its siblings.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::dedup::DedupDecision;
use super::dedup::DedupTracker;
use super::parser::parse_batch;
use super::upsert::VectorUpserter;
use super::validator::RecordValidator;
use crate::cancellable;
use crate::embeddings::EmbeddingCache;
use crate::fingerprint::content_fingerprint;
use crate::models::AnalyticsPost;
use crate::models::DeadLetterEntry;
use crate::models::IndexMetrics;
use crate::retrieval::SearchCacheInvalidator;
use crate::storage::BatchLocation;
use crate::storage::ContentStore;
use crate::tracking::TrackingStore;
use crate::KnowRagError;
use crate::Result;

const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// One batch to ingest
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub batch_id: String,
    /// Partition every record of the batch belongs to
    pub project_id: String,
    /// `s3://bucket/key` of the newline-delimited file
    pub location: String,
}

/// Result of processing one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Indexed,
    /// Not indexed, not an error; `error_type` is set for classified skips
    Skipped {
        error_type: Option<String>,
        reason: String,
    },
    Failed { error_type: String, message: String },
}

impl RecordOutcome {
    fn skipped(error: &KnowRagError) -> Self {
        Self::Skipped {
            error_type: Some(error.error_type().to_string()),
            reason: error.to_string(),
        }
    }

    fn failed(error: &KnowRagError) -> Self {
        Self::Failed {
            error_type: error.error_type().to_string(),
            message: error.to_string(),
        }
    }
}

/// A record that did not make it into the index, with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub record_id: String,
    pub error_type: String,
    pub message: String,
}

/// Outcome of a whole batch; `indexed + failed + skipped == total`
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub project_id: String,
    pub total: usize,
    pub indexed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,
    pub failed_records: Vec<FailedRecord>,
    /// Skips that carry an error classification (validation, duplicates)
    pub skipped_records: Vec<FailedRecord>,
}

impl BatchSummary {
    fn record(&mut self, record_id: String, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Indexed => self.indexed += 1,
            RecordOutcome::Skipped { error_type, reason } => {
                self.skipped += 1;
                if let Some(error_type) = error_type {
                    self.skipped_records.push(FailedRecord {
                        record_id,
                        error_type,
                        message: reason,
                    });
                }
            }
            RecordOutcome::Failed {
                error_type,
                message,
            } => {
                self.failed += 1;
                self.failed_records.push(FailedRecord {
                    record_id,
                    error_type,
                    message,
                });
            }
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.indexed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Everything one record needs, shared by all tasks of a batch
struct RecordPipeline {
    validator: RecordValidator,
    dedup: DedupTracker,
    embeddings: EmbeddingCache,
    upserter: VectorUpserter,
    tracking: Arc<dyn TrackingStore>,
}

impl RecordPipeline {
    async fn process(
        &self,
        post: &AnalyticsPost,
        partition: &str,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        if let Err(e) = self.validator.validate(post, partition) {
            debug!("Skipping {}: {}", post.id, e);
            return RecordOutcome::skipped(&e);
        }

        if let Some(rejection) = self.validator.quality_gate(post) {
            debug!("Dropping {}: {}", post.id, rejection.describe());
            return RecordOutcome::Skipped {
                error_type: None,
                reason: rejection.describe(),
            };
        }

        let fingerprint = content_fingerprint(&post.content);

        match self.dedup.check(post, &fingerprint).await {
            Ok(DedupDecision::Duplicate { existing_id }) => {
                return RecordOutcome::skipped(&KnowRagError::DuplicateContent {
                    fingerprint,
                    existing_id,
                });
            }
            Ok(DedupDecision::New | DedupDecision::Reindex) => {}
            Err(e) => return RecordOutcome::failed(&e),
        }

        let doc = match self
            .dedup
            .begin(post, &fingerprint, self.upserter.collection(), batch_id)
            .await
        {
            Ok(doc) => doc,
            Err(e @ KnowRagError::DuplicateContent { .. }) => return RecordOutcome::skipped(&e),
            Err(e) => return RecordOutcome::failed(&e),
        };

        let started = Instant::now();
        let indexed = async {
            let vector = cancellable(cancel, self.embeddings.generate(&post.content)).await?;
            let embedding_time_ms = elapsed_ms(started);

            let upsert_started = Instant::now();
            cancellable(cancel, self.upserter.upsert(post, vector)).await?;

            Ok::<_, KnowRagError>(IndexMetrics {
                embedding_time_ms,
                upsert_time_ms: elapsed_ms(upsert_started),
                total_time_ms: elapsed_ms(started),
            })
        }
        .await;

        match indexed {
            Ok(metrics) => match self.tracking.mark_indexed(doc.id, metrics).await {
                Ok(()) => RecordOutcome::Indexed,
                Err(e) => {
                    // Point is written but the row still says otherwise
                    warn!("Indexed {} but could not record it: {}", post.id, e);
                    RecordOutcome::failed(&e)
                }
            },
            Err(e) => {
                if let Err(track_err) = self
                    .tracking
                    .mark_failed(doc.id, e.error_type(), &e.to_string())
                    .await
                {
                    warn!("Could not mark {} as failed: {}", post.id, track_err);
                }
                RecordOutcome::failed(&e)
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> i64 {
    i64::try_from(since.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "record task panicked".to_string())
}

/// Fans batches out over a bounded pool of record tasks
pub struct BatchOrchestrator {
    content: Arc<dyn ContentStore>,
    pipeline: Arc<RecordPipeline>,
    tracking: Arc<dyn TrackingStore>,
    invalidator: Option<SearchCacheInvalidator>,
    max_concurrency: usize,
}

impl BatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: Arc<dyn ContentStore>,
        tracking: Arc<dyn TrackingStore>,
        embeddings: EmbeddingCache,
        upserter: VectorUpserter,
        validator: RecordValidator,
        invalidator: Option<SearchCacheInvalidator>,
        max_concurrency: usize,
    ) -> Self {
        let pipeline = RecordPipeline {
            validator,
            dedup: DedupTracker::new(tracking.clone()),
            embeddings,
            upserter,
            tracking: tracking.clone(),
        };
        Self {
            content,
            pipeline: Arc::new(pipeline),
            tracking,
            invalidator,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Download, parse and index one batch.
    ///
    /// Only batch-level problems (bad location, unreadable file) are errors;
    /// per-record problems end up in the summary.
    pub async fn run(&self, request: &BatchRequest, cancel: &CancellationToken) -> Result<BatchSummary> {
        let started = Instant::now();
        let location = BatchLocation::parse(&request.location)?;
        info!(
            "Ingesting batch {} for project {} from {}",
            request.batch_id, request.project_id, location
        );

        let bytes = cancellable(cancel, self.content.download(&location.bucket, &location.key)).await?;
        let parsed = parse_batch(bytes.as_slice()).await?;

        let mut summary = self.process_posts(request, parsed.posts, cancel).await;

        summary.total += parsed.malformed.len();
        for line in &parsed.malformed {
            let record_id = line.report_id();
            let error = line.to_error();
            self.dead_letter(request, &record_id, &error, line.raw.clone()).await;
            summary.record(record_id, RecordOutcome::failed(&error));
        }

        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Batch {} complete: {} total, {} indexed, {} skipped, {} failed in {}ms",
            summary.batch_id,
            summary.total,
            summary.indexed,
            summary.skipped,
            summary.failed,
            summary.elapsed_ms
        );
        Ok(summary)
    }

    /// Index already-decoded posts under the concurrency ceiling
    pub async fn process_posts(
        &self,
        request: &BatchRequest,
        posts: Vec<AnalyticsPost>,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            batch_id: request.batch_id.clone(),
            project_id: request.project_id.clone(),
            total: posts.len(),
            ..BatchSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut touched = BTreeSet::new();
        let mut posts = posts.into_iter();

        while let Some(post) = posts.next() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                // Not dispatched; counted so the batch still adds up
                for post in std::iter::once(post).chain(posts.by_ref()) {
                    summary.record(post.id, RecordOutcome::failed(&KnowRagError::Cancelled));
                }
                break;
            };

            let pipeline = self.pipeline.clone();
            let tracking = self.tracking.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(pipeline.process(
                    &post,
                    &request.project_id,
                    &request.batch_id,
                    &cancel,
                ))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| RecordOutcome::Failed {
                    error_type: INTERNAL_ERROR.to_string(),
                    message: panic_message(panic.as_ref()),
                });
                drop(permit);

                if let RecordOutcome::Failed {
                    error_type,
                    message,
                } = &outcome
                {
                    if error_type != KnowRagError::Cancelled.error_type() {
                        write_dead_letter(tracking.as_ref(), &request, &post, error_type, message)
                            .await;
                    }
                }
                (post.id, post.project_id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((record_id, project_id, outcome)) => {
                    if outcome == RecordOutcome::Indexed {
                        touched.insert(project_id);
                    }
                    summary.record(record_id, outcome);
                }
                Err(e) => {
                    // Only reachable if the runtime aborts the task
                    warn!("Record task did not complete: {}", e);
                    summary.record(
                        "unknown".to_string(),
                        RecordOutcome::Failed {
                            error_type: INTERNAL_ERROR.to_string(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        if summary.indexed > 0 {
            self.invalidate(&touched).await;
        }

        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        summary
    }

    async fn invalidate(&self, partitions: &BTreeSet<String>) {
        let Some(invalidator) = &self.invalidator else {
            return;
        };
        for partition in partitions {
            if let Err(e) = invalidator.invalidate_partition(partition).await {
                warn!("Cache invalidation for partition {} failed: {}", partition, e);
            }
        }
    }

    async fn dead_letter(
        &self,
        request: &BatchRequest,
        record_id: &str,
        error: &KnowRagError,
        raw: serde_json::Value,
    ) {
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            analytics_id: record_id.to_string(),
            project_id: request.project_id.clone(),
            batch_id: Some(request.batch_id.clone()),
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
            raw_payload: raw,
            retry_count: 0,
            created_at: Utc::now(),
        };
        if let Err(e) = self.tracking.record_dead_letter(&entry).await {
            warn!("Could not dead-letter {}: {}", record_id, e);
        }
    }
}

async fn write_dead_letter(
    tracking: &dyn TrackingStore,
    request: &BatchRequest,
    post: &AnalyticsPost,
    error_type: &str,
    message: &str,
) {
    let retry_count = match tracking.find_by_analytics_id(&post.id).await {
        Ok(Some(doc)) => doc.retry_count,
        _ => 0,
    };
    let entry = DeadLetterEntry {
        id: Uuid::new_v4(),
        analytics_id: post.id.clone(),
        project_id: request.project_id.clone(),
        batch_id: Some(request.batch_id.clone()),
        error_type: error_type.to_string(),
        error_message: message.to_string(),
        raw_payload: serde_json::to_value(post).unwrap_or(serde_json::Value::Null),
        retry_count,
        created_at: Utc::now(),
    };
    if let Err(e) = tracking.record_dead_letter(&entry).await {
        warn!("Could not dead-letter {}: {}", post.id, e);
    }
}
