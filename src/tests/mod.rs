pub mod ingestion_tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use dashmap::DashMap;

use crate::cache::CacheStore;
use crate::cache::MemoryCache;
use crate::embeddings::EmbeddingProvider;
use crate::errors::EmbeddingError;
use crate::models::AnalyticsPost;
use crate::models::Aspect;
use crate::models::Campaign;
use crate::models::Engagement;
use crate::models::UapMetadata;
use crate::retrieval::ProjectService;
use crate::storage::LocalContentStore;
use crate::tracking::MemoryTrackingStore;
use crate::vector::FacetField;
use crate::vector::FacetHit;
use crate::vector::Filter;
use crate::vector::MemoryVectorStore;
use crate::vector::ScoredPoint;
use crate::vector::SearchQuery;
use crate::vector::VectorPoint;
use crate::vector::VectorStore;
use crate::AppConfig;
use crate::Backends;
use crate::KnowRag;
use crate::KnowRagError;
use crate::Result;

/// Test helper building a well-formed post that passes every ingestion gate
pub fn post(id: &str, project: &str, content: &str) -> AnalyticsPost {
    AnalyticsPost {
        id: id.to_string(),
        project_id: project.to_string(),
        source_id: format!("src-{id}"),
        content: content.to_string(),
        content_created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ingested_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap(),
        platform: "TIKTOK".to_string(),
        uap_metadata: UapMetadata {
            author: "alice".to_string(),
            author_display_name: "Alice".to_string(),
            author_followers: 1200,
            engagement: Engagement {
                views: 100,
                likes: 10,
                comments: 2,
                shares: 1,
            },
            video_url: None,
            hashtags: None,
            location: None,
        },
        overall_sentiment: "POSITIVE".to_string(),
        overall_sentiment_score: 0.7,
        sentiment_confidence: 0.9,
        aspects: vec![Aspect {
            aspect: "BATTERY".to_string(),
            aspect_display_name: "Battery".to_string(),
            sentiment: "POSITIVE".to_string(),
            sentiment_score: 0.8,
            keywords: vec!["battery".to_string()],
            mentions: 1,
            impact_score: 0.5,
        }],
        keywords: vec!["battery".to_string()],
        risk_level: "LOW".to_string(),
        risk_score: 0.1,
        risk_factors: serde_json::Value::Null,
        requires_attention: false,
        alert_triggered: false,
        engagement_score: 5.0,
        virality_score: 0.2,
        influence_score: 0.3,
        reach_estimate: 1500,
        content_quality_score: 0.8,
        is_spam: false,
        is_bot: false,
        language: "en".to_string(),
        toxicity_score: 0.0,
    }
}

/// Deterministic embedding provider with call instrumentation
pub struct FakeEmbeddingProvider {
    dim: usize,
    returning: Option<usize>,
    fail: bool,
    delay: Option<Duration>,
    panic_marker: Option<String>,
    fixed: DashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    texts_sent: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            returning: None,
            fail: false,
            delay: None,
            panic_marker: None,
            fixed: DashMap::new(),
            calls: AtomicUsize::new(0),
            texts_sent: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer every request with exactly `n` vectors
    #[must_use]
    pub fn returning_count(mut self, n: usize) -> Self {
        self.returning = Some(n);
        self
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Hold each request open for `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic when asked to embed text containing `marker`
    #[must_use]
    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_marker = Some(marker.to_string());
        self
    }

    /// Pin the vector returned for `text`
    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.fixed.insert(text.to_string(), vector);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_sent(&self) -> usize {
        self.texts_sent.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(fixed) = self.fixed.get(text) {
            return fixed.value().clone();
        }
        let digest = crate::fingerprint::content_fingerprint(text);
        let bytes = digest.as_bytes();
        (0..self.dim)
            .map(|i| f32::from(bytes[i % bytes.len()]) / 255.0 + 0.01)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_sent.fetch_add(texts.len(), Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.panic_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                panic!("embedding provider blew up on {marker}");
            }
        }
        if self.fail {
            return Err(EmbeddingError::Provider("provider unavailable".to_string()).into());
        }

        let count = self.returning.unwrap_or(texts.len());
        Ok((0..count)
            .map(|i| texts.get(i).map_or_else(|| vec![0.5; self.dim], |t| self.vector_for(t)))
            .collect())
    }

    fn model_name(&self) -> &str {
        "fake-embedding"
    }
}

/// In-memory campaign directory
#[derive(Default)]
pub struct FakeProjectService {
    campaigns: DashMap<String, Campaign>,
    calls: AtomicUsize,
}

impl FakeProjectService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_campaign(&self, id: &str, projects: &[&str]) {
        self.campaigns.insert(
            id.to_string(),
            Campaign {
                id: id.to_string(),
                name: format!("Campaign {id}"),
                project_ids: projects.iter().map(|p| (*p).to_string()).collect(),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectService for FakeProjectService {
    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.campaigns.get(campaign_id).map(|c| c.value().clone()))
    }
}

/// Vector store operations a [`FailingVectorStore`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
    Upsert,
    Search,
    Count,
    Facet,
}

/// Passes through to a memory store until an operation is switched to fail
pub struct FailingVectorStore {
    inner: Arc<MemoryVectorStore>,
    upsert: AtomicBool,
    search: AtomicBool,
    count: AtomicBool,
    facet: AtomicBool,
}

impl FailingVectorStore {
    pub fn new(inner: Arc<MemoryVectorStore>) -> Self {
        Self {
            inner,
            upsert: AtomicBool::new(false),
            search: AtomicBool::new(false),
            count: AtomicBool::new(false),
            facet: AtomicBool::new(false),
        }
    }

    pub fn fail_on(&self, op: VectorOp) {
        self.flag(op).store(true, Ordering::SeqCst);
    }

    fn flag(&self, op: VectorOp) -> &AtomicBool {
        match op {
            VectorOp::Upsert => &self.upsert,
            VectorOp::Search => &self.search,
            VectorOp::Count => &self.count,
            VectorOp::Facet => &self.facet,
        }
    }

    fn check(&self, op: VectorOp) -> Result<()> {
        if self.flag(op).load(Ordering::SeqCst) {
            return Err(KnowRagError::VectorStore(format!("{op:?} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        self.check(VectorOp::Upsert)?;
        self.inner.upsert_points(collection, points).await
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<ScoredPoint>> {
        self.check(VectorOp::Search)?;
        self.inner.search(collection, query).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.check(VectorOp::Count)?;
        self.inner.count(collection, filter).await
    }

    async fn facet(
        &self,
        collection: &str,
        field: &FacetField,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<FacetHit>> {
        self.check(VectorOp::Facet)?;
        self.inner.facet(collection, field, filter, limit).await
    }
}

/// Passes through to a memory cache until reads or writes are switched to fail
pub struct FailingCache {
    inner: Arc<MemoryCache>,
    reads: AtomicBool,
    writes: AtomicBool,
}

impl FailingCache {
    pub fn new(inner: Arc<MemoryCache>) -> Self {
        Self {
            inner,
            reads: AtomicBool::new(false),
            writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self) {
        self.reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.writes.store(true, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(KnowRagError::Cache(format!("{op} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Self::check(&self.reads, "GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        Self::check(&self.writes, "SET")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Self::check(&self.writes, "DEL")?;
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        Self::check(&self.writes, "SCAN")?;
        self.inner.delete_prefix(prefix).await
    }
}

/// A fully wired instance over in-memory backends and a temporary bucket root
pub struct Harness {
    pub knowrag: KnowRag,
    pub tracking: Arc<MemoryTrackingStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub cache: Arc<MemoryCache>,
    pub embedder: Arc<FakeEmbeddingProvider>,
    pub projects: Arc<FakeProjectService>,
    /// Fault switches in front of `vectors`
    pub vector_faults: Arc<FailingVectorStore>,
    /// Fault switches in front of `cache`
    pub cache_faults: Arc<FailingCache>,
    root: tempfile::TempDir,
}

impl Harness {
    pub fn new(embedder: FakeEmbeddingProvider) -> Self {
        Self::with_config(AppConfig::default(), embedder)
    }

    pub fn with_config(config: AppConfig, embedder: FakeEmbeddingProvider) -> Self {
        let root = tempfile::tempdir().expect("temp dir");
        let tracking = Arc::new(MemoryTrackingStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let cache = Arc::new(MemoryCache::new());
        let embedder = Arc::new(embedder);
        let projects = Arc::new(FakeProjectService::new());
        let vector_faults = Arc::new(FailingVectorStore::new(vectors.clone()));
        let cache_faults = Arc::new(FailingCache::new(cache.clone()));

        let backends = Backends {
            tracking: tracking.clone(),
            vectors: vector_faults.clone(),
            cache: cache_faults.clone(),
            embedder: embedder.clone(),
            projects: projects.clone(),
            content: Arc::new(LocalContentStore::new(root.path())),
        };

        Self {
            knowrag: KnowRag::with_backends(config, backends),
            tracking,
            vectors,
            cache,
            embedder,
            projects,
            vector_faults,
            cache_faults,
            root,
        }
    }

    /// Write `lines` as a batch object and return its `s3://` location
    pub fn write_batch(&self, key: &str, lines: &[String]) -> String {
        self.write_batch_bytes(key, lines.join("\n").as_bytes())
    }

    /// Write raw bytes as a batch object, for content that is not valid text
    pub fn write_batch_bytes(&self, key: &str, bytes: &[u8]) -> String {
        let path = self.root.path().join("batches").join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("bucket dir");
        }
        std::fs::write(&path, bytes).expect("batch file");
        format!("s3://batches/{key}")
    }

    pub fn collection(&self) -> String {
        self.knowrag.config().collection().to_string()
    }
}

/// JSON line for a post
pub fn line(post: &AnalyticsPost) -> String {
    serde_json::to_string(post).expect("post encodes")
}
