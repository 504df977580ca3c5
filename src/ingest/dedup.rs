//! Fingerprint-based duplicate detection

use std::sync::Arc;

use tracing::debug;

use crate::models::AnalyticsPost;
use crate::models::IndexedDocument;
use crate::tracking::TrackingStore;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// Never seen; a new tracking row will be created
    New,
    /// Same source record seen before; its row and point are reused
    Reindex,
    /// Another record in the partition already owns this content
    Duplicate { existing_id: String },
}

#[derive(Clone)]
pub struct DedupTracker {
    tracking: Arc<dyn TrackingStore>,
}

impl DedupTracker {
    pub fn new(tracking: Arc<dyn TrackingStore>) -> Self {
        Self { tracking }
    }

    /// Classify `post` whose content hashes to `fingerprint`.
    ///
    /// The source record ID is consulted first, so a re-index never collides with
    /// its own earlier fingerprint.
    pub async fn check(&self, post: &AnalyticsPost, fingerprint: &str) -> Result<DedupDecision> {
        if self.tracking.find_by_analytics_id(&post.id).await?.is_some() {
            debug!("Record {} already tracked, re-indexing", post.id);
            return Ok(DedupDecision::Reindex);
        }

        if let Some(owner) = self
            .tracking
            .find_by_content_hash(&post.project_id, fingerprint)
            .await?
        {
            debug!(
                "Record {} duplicates content of {} in project {}",
                post.id, owner.analytics_id, post.project_id
            );
            return Ok(DedupDecision::Duplicate {
                existing_id: owner.analytics_id,
            });
        }

        Ok(DedupDecision::New)
    }

    /// Create or refresh the tracking row; may still report a duplicate that
    /// appeared concurrently
    pub async fn begin(
        &self,
        post: &AnalyticsPost,
        fingerprint: &str,
        collection: &str,
        batch_id: &str,
    ) -> Result<IndexedDocument> {
        let doc = IndexedDocument::pending(post, fingerprint, collection, Some(batch_id));
        self.tracking.begin_indexing(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::content_fingerprint;
    use crate::tests::post;
    use crate::tracking::MemoryTrackingStore;

    #[tokio::test]
    async fn test_decisions() {
        let store = Arc::new(MemoryTrackingStore::new());
        let tracker = DedupTracker::new(store.clone());

        let first = post("a1", "p1", "identical content here");
        let hash = content_fingerprint(&first.content);
        assert_eq!(tracker.check(&first, &hash).await.unwrap(), DedupDecision::New);
        tracker.begin(&first, &hash, "c", "b1").await.unwrap();

        // Same ID, new content: re-index
        let edited = post("a1", "p1", "edited content here");
        let edited_hash = content_fingerprint(&edited.content);
        assert_eq!(
            tracker.check(&edited, &edited_hash).await.unwrap(),
            DedupDecision::Reindex
        );

        // Different ID, same content: duplicate
        let copy = post("a2", "p1", "identical content here");
        assert_eq!(
            tracker.check(&copy, &hash).await.unwrap(),
            DedupDecision::Duplicate {
                existing_id: "a1".to_string()
            }
        );

        // Same content in another partition is independent
        let elsewhere = post("a3", "p2", "identical content here");
        assert_eq!(tracker.check(&elsewhere, &hash).await.unwrap(), DedupDecision::New);
    }
}
