//! Vector upsert gateway

use std::sync::Arc;

use crate::models::AnalyticsPost;
use crate::vector::PointPayload;
use crate::vector::VectorPoint;
use crate::vector::VectorStore;
use crate::KnowRagError;
use crate::Result;

/// Writes one point per post into the configured collection, keyed by record ID
#[derive(Clone)]
pub struct VectorUpserter {
    store: Arc<dyn VectorStore>,
    collection: String,
    max_content_chars: usize,
}

impl VectorUpserter {
    pub fn new(store: Arc<dyn VectorStore>, collection: &str, max_content_chars: usize) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            max_content_chars,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Single attempt; any failure is reported as an upsert failure
    pub async fn upsert(&self, post: &AnalyticsPost, vector: Vec<f32>) -> Result<()> {
        let point = VectorPoint {
            id: post.id.clone(),
            vector,
            payload: PointPayload::from_post(post, self.max_content_chars),
        };

        self.store
            .upsert_points(&self.collection, std::slice::from_ref(&point))
            .await
            .map_err(|e| match e {
                KnowRagError::VectorStoreUpsert(_) => e,
                other => KnowRagError::VectorStoreUpsert(other.to_string()),
            })
    }
}
