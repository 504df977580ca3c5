//! Vector store abstraction
//!
//! Points live in named collections, keyed by point ID (the source record ID),
//! each carrying an embedding and a typed [`PointPayload`]. Stores answer
//! filtered similarity search, filtered counts and value facets.

pub mod filter;
pub mod memory;
pub mod payload;
pub mod pg_store;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use self::filter::Condition;
pub use self::filter::Filter;
pub use self::memory::MemoryVectorStore;
pub use self::payload::AspectPayload;
pub use self::payload::PayloadMetadata;
pub use self::payload::PointPayload;
pub use self::pg_store::PgVectorStore;
use crate::Result;

/// One point to write
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Filtered nearest-neighbour request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub filter: Filter,
    pub limit: usize,
}

/// Search hit; `score` is cosine similarity, higher is closer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Payload field to facet on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetField {
    /// Top-level scalar field
    Field(String),
    /// Field of the objects inside a nested array; a point counts once per value
    Nested { array: String, field: String },
}

impl FacetField {
    pub fn field(name: &str) -> Self {
        Self::Field(name.to_string())
    }

    pub fn nested(array: &str, field: &str) -> Self {
        Self::Nested {
            array: array.to_string(),
            field: field.to_string(),
        }
    }
}

/// Distinct value and the number of matching points carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetHit {
    pub value: String,
    pub count: u64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite points by ID
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()>;

    /// Nearest points matching the filter, best first.
    ///
    /// No score threshold is applied.
    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Value counts for `field` over points matching `filter`, most frequent first
    async fn facet(
        &self,
        collection: &str,
        field: &FacetField,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<FacetHit>>;
}
