//! Indexing lifecycle tracking
//!
//! Every source record processed by the pipeline owns one [`IndexedDocument`]
//! row. Rows are never deleted; status moves along
//! `PENDING -> INDEXED`, `PENDING -> FAILED` and `FAILED -> PENDING` only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::DeadLetterEntry;
use crate::models::IndexMetrics;
use crate::models::IndexStatistics;
use crate::models::IndexStatus;
use crate::models::IndexedDocument;
use crate::KnowRagError;
use crate::Result;

/// Relational store of tracking rows and dead letters
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn find_by_analytics_id(&self, analytics_id: &str) -> Result<Option<IndexedDocument>>;

    /// Row in `project_id` whose content has fingerprint `content_hash`
    async fn find_by_content_hash(
        &self,
        project_id: &str,
        content_hash: &str,
    ) -> Result<Option<IndexedDocument>>;

    /// Create the row for `doc`, or refresh the existing row with the same
    /// analytics ID (re-index).
    ///
    /// A new row whose fingerprint is already tracked in the same partition is
    /// rejected with [`KnowRagError::DuplicateContent`]; this check is atomic with
    /// the insert. An existing `FAILED` row goes back to `PENDING`, an `INDEXED`
    /// row keeps its status. Returns the stored row.
    async fn begin_indexing(&self, doc: &IndexedDocument) -> Result<IndexedDocument>;

    async fn mark_indexed(&self, id: Uuid, metrics: IndexMetrics) -> Result<()>;

    /// Record a failure; `INDEXED` rows keep their status
    async fn mark_failed(&self, id: Uuid, error_type: &str, message: &str) -> Result<()>;

    /// `FAILED` rows with `retry_count < max_retries`, oldest first
    async fn list_failed_for_retry(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>>;

    /// `FAILED -> PENDING` with an incremented retry count; false if the row was
    /// no longer `FAILED`
    async fn requeue(&self, id: Uuid) -> Result<bool>;

    /// `PENDING` rows last touched before `older_than`, oldest first
    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>>;

    /// `PENDING -> FAILED` for a stale row; false if the row moved on meanwhile
    async fn mark_stale(&self, id: Uuid, message: &str) -> Result<bool>;

    async fn statistics(&self, project_id: Option<&str>) -> Result<IndexStatistics>;

    async fn record_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()>;

    async fn list_dead_letters(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeadLetterEntry>>;
}

/// Error type recorded by reconciliation
pub const STALE_ERROR_TYPE: &str = "STALE_PENDING";

#[derive(Debug, Default)]
struct TrackingState {
    documents: HashMap<Uuid, IndexedDocument>,
    dead_letters: Vec<DeadLetterEntry>,
}

impl TrackingState {
    fn by_analytics_id(&self, analytics_id: &str) -> Option<&IndexedDocument> {
        self.documents
            .values()
            .find(|d| d.analytics_id == analytics_id)
    }
}

/// [`TrackingStore`] held in process memory, used for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    state: RwLock<TrackingState>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row exactly as given, timestamps included
    pub async fn insert(&self, doc: IndexedDocument) {
        self.state.write().await.documents.insert(doc.id, doc);
    }

    pub async fn get(&self, id: Uuid) -> Option<IndexedDocument> {
        self.state.read().await.documents.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn missing_row(id: Uuid) -> KnowRagError {
    KnowRagError::TrackingStore(format!("tracking row {id} not found"))
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn find_by_analytics_id(&self, analytics_id: &str) -> Result<Option<IndexedDocument>> {
        Ok(self.state.read().await.by_analytics_id(analytics_id).cloned())
    }

    async fn find_by_content_hash(
        &self,
        project_id: &str,
        content_hash: &str,
    ) -> Result<Option<IndexedDocument>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.project_id == project_id && d.content_hash == content_hash)
            .min_by_key(|d| d.created_at)
            .cloned())
    }

    async fn begin_indexing(&self, doc: &IndexedDocument) -> Result<IndexedDocument> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(existing) = state.by_analytics_id(&doc.analytics_id).map(|d| d.id) {
            let row = state
                .documents
                .get_mut(&existing)
                .ok_or_else(|| missing_row(existing))?;
            row.project_id = doc.project_id.clone();
            row.content_hash = doc.content_hash.clone();
            row.collection_name = doc.collection_name.clone();
            row.batch_id = doc.batch_id.clone();
            if row.status != IndexStatus::Indexed {
                row.status = IndexStatus::Pending;
            }
            row.error_message = None;
            row.error_type = None;
            row.updated_at = now;
            return Ok(row.clone());
        }

        if let Some(owner) = state
            .documents
            .values()
            .find(|d| d.project_id == doc.project_id && d.content_hash == doc.content_hash)
        {
            return Err(KnowRagError::DuplicateContent {
                fingerprint: doc.content_hash.clone(),
                existing_id: owner.analytics_id.clone(),
            });
        }

        let mut row = doc.clone();
        row.status = IndexStatus::Pending;
        row.updated_at = now;
        state.documents.insert(row.id, row.clone());
        Ok(row)
    }

    async fn mark_indexed(&self, id: Uuid, metrics: IndexMetrics) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state.documents.get_mut(&id).ok_or_else(|| missing_row(id))?;
        if row.status == IndexStatus::Failed {
            return Err(KnowRagError::TrackingStore(format!(
                "tracking row {id} is FAILED and cannot become INDEXED"
            )));
        }
        let now = Utc::now();
        row.status = IndexStatus::Indexed;
        row.error_message = None;
        row.error_type = None;
        row.embedding_time_ms = Some(metrics.embedding_time_ms);
        row.upsert_time_ms = Some(metrics.upsert_time_ms);
        row.total_time_ms = Some(metrics.total_time_ms);
        row.indexed_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_type: &str, message: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state.documents.get_mut(&id).ok_or_else(|| missing_row(id))?;
        if row.status != IndexStatus::Indexed {
            row.status = IndexStatus::Failed;
        }
        row.error_type = Some(error_type.to_string());
        row.error_message = Some(message.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn list_failed_for_retry(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>> {
        let state = self.state.read().await;
        let mut rows: Vec<IndexedDocument> = state
            .documents
            .values()
            .filter(|d| d.status == IndexStatus::Failed && d.retry_count < max_retries)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.created_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let row = state.documents.get_mut(&id).ok_or_else(|| missing_row(id))?;
        if row.status != IndexStatus::Failed {
            return Ok(false);
        }
        row.status = IndexStatus::Pending;
        row.retry_count += 1;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>> {
        let state = self.state.read().await;
        let mut rows: Vec<IndexedDocument> = state
            .documents
            .values()
            .filter(|d| d.status == IndexStatus::Pending && d.updated_at < older_than)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.updated_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn mark_stale(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let row = state.documents.get_mut(&id).ok_or_else(|| missing_row(id))?;
        if row.status != IndexStatus::Pending {
            return Ok(false);
        }
        row.status = IndexStatus::Failed;
        row.error_type = Some(STALE_ERROR_TYPE.to_string());
        row.error_message = Some(message.to_string());
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn statistics(&self, project_id: Option<&str>) -> Result<IndexStatistics> {
        let state = self.state.read().await;
        let mut stats = IndexStatistics {
            project_id: project_id.map(str::to_string),
            ..IndexStatistics::default()
        };
        let mut timed = 0_i64;
        let mut time_sum = 0_i64;

        for doc in state
            .documents
            .values()
            .filter(|d| project_id.map_or(true, |p| d.project_id == p))
        {
            match doc.status {
                IndexStatus::Indexed => {
                    stats.total_indexed += 1;
                    stats.last_indexed_at = stats.last_indexed_at.max(doc.indexed_at);
                    if let Some(ms) = doc.total_time_ms {
                        timed += 1;
                        time_sum += ms;
                    }
                }
                IndexStatus::Failed => stats.total_failed += 1,
                IndexStatus::Pending | IndexStatus::ReIndexing => stats.total_pending += 1,
            }
        }

        if timed > 0 {
            stats.avg_index_time_ms = time_sum as f64 / timed as f64;
        }
        Ok(stats)
    }

    async fn record_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        self.state.write().await.dead_letters.push(entry.clone());
        Ok(())
    }

    async fn list_dead_letters(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeadLetterEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<DeadLetterEntry> = state
            .dead_letters
            .iter()
            .filter(|e| project_id.map_or(true, |p| e.project_id == p))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(entries)
    }
}
