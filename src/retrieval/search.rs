//! Campaign-scoped semantic search

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use super::aggregator::aggregate;
use super::aggregator::Aggregations;
use super::filters::build_filter;
use super::filters::SearchFilters;
use super::invalidation::search_key_prefix;
use super::resolver::CampaignResolver;
use crate::cache;
use crate::cache::CacheStore;
use crate::cancellable;
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingCache;
use crate::fingerprint::composite_fingerprint;
use crate::vector::AspectPayload;
use crate::vector::ScoredPoint;
use crate::vector::SearchQuery;
use crate::vector::VectorStore;
use crate::KnowRagError;
use crate::Result;

/// Candidates fetched per requested result, before the score floor
const OVERFETCH_FACTOR: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub campaign_id: String,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Defaults when unset or zero, capped at the configured maximum
    #[serde(default)]
    pub limit: Option<usize>,
    /// Defaults when unset or not positive
    #[serde(default)]
    pub min_score: Option<f32>,
}

/// One returned document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub project_id: String,
    pub source_id: String,
    pub platform: String,
    pub overall_sentiment: String,
    pub overall_sentiment_score: f64,
    pub risk_level: String,
    pub engagement_score: f64,
    /// Unix seconds
    pub content_created_at: i64,
    pub author: String,
    pub keywords: Vec<String>,
    pub aspects: Vec<AspectPayload>,
}

impl From<ScoredPoint> for SearchHit {
    fn from(point: ScoredPoint) -> Self {
        let payload = point.payload;
        Self {
            id: point.id,
            score: point.score,
            content: payload.content,
            project_id: payload.project_id,
            source_id: payload.source_id,
            platform: payload.platform,
            overall_sentiment: payload.overall_sentiment,
            overall_sentiment_score: payload.overall_sentiment_score,
            risk_level: payload.risk_level,
            engagement_score: payload.engagement_score,
            content_created_at: payload.content_created_at,
            author: payload.metadata.author,
            keywords: payload.keywords,
            aspects: payload.aspects,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub aggregations: Aggregations,
    /// Nothing cleared the score floor
    pub no_relevant_context: bool,
    pub cache_hit: bool,
    pub elapsed_ms: u64,
}

/// Semantic search over the partitions of one campaign
#[derive(Clone)]
pub struct SearchEngine {
    resolver: CampaignResolver,
    embeddings: EmbeddingCache,
    store: Arc<dyn VectorStore>,
    cache: Arc<dyn CacheStore>,
    collection: String,
    settings: RetrievalConfig,
}

impl SearchEngine {
    pub fn new(
        resolver: CampaignResolver,
        embeddings: EmbeddingCache,
        store: Arc<dyn VectorStore>,
        cache: Arc<dyn CacheStore>,
        collection: impl Into<String>,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            resolver,
            embeddings,
            store,
            cache,
            collection: collection.into(),
            settings,
        }
    }

    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutput> {
        let started = Instant::now();

        if request.campaign_id.trim().is_empty() {
            return Err(KnowRagError::Validation("campaign id is required".to_string()));
        }
        let query = request.query.trim();
        self.validate_query(query)?;
        request.filters.validate()?;
        let limit = self.effective_limit(request.limit);
        let min_score = self.effective_min_score(request.min_score);

        let cache_key = self.cache_key(request, query, limit, min_score)?;
        if let Some(mut cached) = cache::get_json::<SearchOutput>(self.cache.as_ref(), &cache_key).await
        {
            cached.cache_hit = true;
            cached.elapsed_ms = elapsed_ms(started);
            return Ok(cached);
        }

        let partitions = cancellable(cancel, self.resolver.resolve(&request.campaign_id)).await?;
        let vector = cancellable(cancel, self.embeddings.generate(query)).await?;
        let filter = build_filter(&partitions, &request.filters)?;

        let search_query = SearchQuery {
            vector,
            filter,
            limit: limit * OVERFETCH_FACTOR,
        };
        let candidates = cancellable(cancel, self.store.search(&self.collection, &search_query))
            .await
            .map_err(|e| match e {
                KnowRagError::Cancelled => e,
                other => KnowRagError::SearchFailed(other.to_string()),
            })?;
        let candidate_count = candidates.len();

        let results: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|point| point.score >= min_score)
            .take(limit)
            .map(SearchHit::from)
            .collect();
        debug!(
            "{} of {} candidates cleared min_score {}",
            results.len(),
            candidate_count,
            min_score
        );

        let output = SearchOutput {
            total: results.len(),
            aggregations: aggregate(&results),
            no_relevant_context: results.is_empty(),
            results,
            cache_hit: false,
            elapsed_ms: elapsed_ms(started),
        };

        cache::set_json(
            self.cache.as_ref(),
            &cache_key,
            &output,
            Duration::from_secs(self.settings.search_cache_ttl_secs),
        )
        .await;

        info!(
            "Search in campaign {} returned {} results in {}ms",
            request.campaign_id, output.total, output.elapsed_ms
        );
        Ok(output)
    }

    fn validate_query(&self, query: &str) -> Result<()> {
        let len = query.chars().count();
        if len < self.settings.min_query_len {
            return Err(KnowRagError::QueryTooShort {
                len,
                min: self.settings.min_query_len,
            });
        }
        if len > self.settings.max_query_len {
            return Err(KnowRagError::QueryTooLong {
                len,
                max: self.settings.max_query_len,
            });
        }
        Ok(())
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        match limit {
            None | Some(0) => self.settings.default_limit,
            Some(n) => n.min(self.settings.max_limit),
        }
    }

    fn effective_min_score(&self, min_score: Option<f32>) -> f32 {
        match min_score {
            Some(s) if s > 0.0 => s,
            _ => self.settings.default_min_score,
        }
    }

    fn cache_key(
        &self,
        request: &SearchRequest,
        query: &str,
        limit: usize,
        min_score: f32,
    ) -> Result<String> {
        let filters = serde_json::to_string(&request.filters)?;
        let limit = limit.to_string();
        let min_score = min_score.to_string();
        let digest = composite_fingerprint(&[
            &request.campaign_id,
            query,
            &filters,
            &limit,
            &min_score,
        ]);
        Ok(format!("{}{}", search_key_prefix(&request.campaign_id), digest))
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::tests::FakeEmbeddingProvider;
    use crate::tests::FakeProjectService;
    use crate::vector::MemoryVectorStore;

    fn engine() -> SearchEngine {
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let service = Arc::new(FakeProjectService::new());
        service.add_campaign("camp", &["p1"]);
        let resolver = CampaignResolver::new(
            service,
            cache.clone(),
            Duration::from_secs(600),
            Duration::from_secs(900),
        );
        let embeddings = EmbeddingCache::new(
            Arc::new(FakeEmbeddingProvider::new(8)),
            cache.clone(),
            Duration::from_secs(60),
        );
        SearchEngine::new(
            resolver,
            embeddings,
            Arc::new(MemoryVectorStore::new()),
            cache,
            "test",
            RetrievalConfig::default(),
        )
    }

    #[test]
    fn test_limit_and_score_defaults() {
        let engine = engine();
        assert_eq!(engine.effective_limit(None), 10);
        assert_eq!(engine.effective_limit(Some(0)), 10);
        assert_eq!(engine.effective_limit(Some(7)), 7);
        assert_eq!(engine.effective_limit(Some(500)), 50);

        assert_eq!(engine.effective_min_score(None), 0.65);
        assert_eq!(engine.effective_min_score(Some(0.0)), 0.65);
        assert_eq!(engine.effective_min_score(Some(-1.0)), 0.65);
        assert_eq!(engine.effective_min_score(Some(0.8)), 0.8);
    }

    #[tokio::test]
    async fn test_query_length_bounds() {
        let engine = engine();
        let cancel = CancellationToken::new();

        let short = SearchRequest {
            campaign_id: "camp".to_string(),
            query: "  ab ".to_string(),
            ..SearchRequest::default()
        };
        let err = engine.search(&short, &cancel).await.unwrap_err();
        assert_eq!(err.error_type(), "QUERY_TOO_SHORT");

        let long = SearchRequest {
            campaign_id: "camp".to_string(),
            query: "x".repeat(1001),
            ..SearchRequest::default()
        };
        let err = engine.search(&long, &cancel).await.unwrap_err();
        assert_eq!(err.error_type(), "QUERY_TOO_LONG");
    }

    #[test]
    fn test_cache_key_depends_on_inputs() {
        let engine = engine();
        let request = SearchRequest {
            campaign_id: "camp".to_string(),
            query: "battery".to_string(),
            ..SearchRequest::default()
        };
        let a = engine.cache_key(&request, "battery", 10, 0.65).unwrap();
        let b = engine.cache_key(&request, "battery", 10, 0.65).unwrap();
        let c = engine.cache_key(&request, "battery", 11, 0.65).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("search:camp:"));
    }
}
