//! In-memory [`VectorStore`] for tests and local runs.
//!
//! Vector search is brute-force cosine similarity over every point in the
//! collection; filters are evaluated against the encoded payload.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::FacetField;
use super::FacetHit;
use super::Filter;
use super::PointPayload;
use super::ScoredPoint;
use super::SearchQuery;
use super::VectorPoint;
use super::VectorStore;
use crate::Result;

struct StoredPoint {
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, StoredPoint>>>,
    searches: AtomicUsize,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in `collection`
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Stored payload of one point
    pub async fn payload(&self, collection: &str, id: &str) -> Option<PointPayload> {
        let collections = self.collections.read().await;
        let point = collections.get(collection)?.get(id)?;
        PointPayload::decode(point.payload.clone()).ok()
    }

    /// How many `search` calls were served
    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn facet_values(payload: &Value, field: &FacetField) -> Vec<String> {
    let as_text = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    };

    let mut values = match field {
        FacetField::Field(key) => payload.get(key).and_then(as_text).into_iter().collect(),
        FacetField::Nested { array, field } => payload
            .get(array)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(field).and_then(as_text))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
    };
    // A point counts once per distinct value
    values.sort();
    values.dedup();
    values
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let encoded = points
            .iter()
            .map(|p| -> Result<_> { Ok((p.id.clone(), p.vector.clone(), p.payload.encode()?)) })
            .collect::<Result<Vec<_>>>()?;

        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();
        for (id, vector, payload) in encoded {
            target.insert(id, StoredPoint { vector, payload });
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<ScoredPoint>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &String, &StoredPoint)> = points
            .iter()
            .filter(|(_, p)| query.filter.matches(&p.payload))
            .map(|(id, p)| (cosine_similarity(&query.vector, &p.vector), id, p))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(query.limit);

        scored
            .into_iter()
            .map(|(score, id, p)| -> Result<ScoredPoint> {
                Ok(ScoredPoint {
                    id: id.clone(),
                    score,
                    payload: PointPayload::decode(p.payload.clone())?,
                })
            })
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |points| {
            points.values().filter(|p| filter.matches(&p.payload)).count() as u64
        }))
    }

    async fn facet(
        &self,
        collection: &str,
        field: &FacetField,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<FacetHit>> {
        let collections = self.collections.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        if let Some(points) = collections.get(collection) {
            for p in points.values().filter(|p| filter.matches(&p.payload)) {
                for value in facet_values(&p.payload, field) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
        }

        let mut hits: Vec<FacetHit> = counts
            .into_iter()
            .map(|(value, count)| FacetHit { value, count })
            .collect();
        hits.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        hits.truncate(limit);
        Ok(hits)
    }
}
