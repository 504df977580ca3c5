pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod fingerprint;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod retrieval;
pub mod storage;
pub mod tracking;
pub mod vector;

#[cfg(test)]
pub mod tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use config::AppConfig;
pub use errors::*;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::cache::MemoryCache;
use crate::cache::RedisCache;
use crate::database::Database;
use crate::embeddings::EmbeddingCache;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::HttpEmbeddingClient;
use crate::ingest::BatchOrchestrator;
use crate::ingest::BatchRequest;
use crate::ingest::BatchSummary;
use crate::ingest::RecordValidator;
use crate::ingest::RecoveryJobs;
use crate::ingest::VectorUpserter;
use crate::retrieval::facets::DEFAULT_FACET_LIMIT;
use crate::retrieval::CampaignAggregate;
use crate::retrieval::CampaignResolver;
use crate::retrieval::FacetEngine;
use crate::retrieval::HttpProjectService;
use crate::retrieval::ProjectService;
use crate::retrieval::SearchCacheInvalidator;
use crate::retrieval::SearchEngine;
use crate::retrieval::SearchFilters;
use crate::retrieval::SearchOutput;
use crate::retrieval::SearchRequest;
use crate::storage::ContentStore;
use crate::storage::LocalContentStore;
use crate::tracking::TrackingStore;
use crate::vector::PgVectorStore;
use crate::vector::VectorStore;

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(KnowRagError::Cancelled),
        result = fut => result,
    }
}

/// External collaborators the core is wired against
#[derive(Clone)]
pub struct Backends {
    pub tracking: Arc<dyn TrackingStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub cache: Arc<dyn CacheStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub projects: Arc<dyn ProjectService>,
    pub content: Arc<dyn ContentStore>,
}

/// Main knowrag client: ingestion, search and recovery over one set of backends
pub struct KnowRag {
    config: AppConfig,
    database: Option<Arc<Database>>,
    orchestrator: BatchOrchestrator,
    search: SearchEngine,
    facets: FacetEngine,
    recovery: RecoveryJobs,
}

impl KnowRag {
    /// Connect to PostgreSQL, the cache, the embedding provider and the project service
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let database = Arc::new(Database::from_config(&config).await?);

        let cache: Arc<dyn CacheStore> = match &config.redis {
            Some(redis) => Arc::new(RedisCache::connect(redis)?),
            None => {
                tracing::warn!("No redis section configured, caching in process memory");
                Arc::new(MemoryCache::new())
            }
        };

        let backends = Backends {
            tracking: database.clone(),
            vectors: Arc::new(PgVectorStore::new(database.pool().clone())),
            cache,
            embedder: Arc::new(HttpEmbeddingClient::from_config(&config.embeddings)?),
            projects: Arc::new(HttpProjectService::from_config(&config.project_service)?),
            content: Arc::new(LocalContentStore::new(config.storage.root.clone())),
        };

        let mut knowrag = Self::with_backends(config, backends);
        knowrag.database = Some(database);
        Ok(knowrag)
    }

    /// Wire the core against explicit backends
    pub fn with_backends(config: AppConfig, backends: Backends) -> Self {
        let retrieval = &config.retrieval;
        let campaign_ttl = Duration::from_secs(retrieval.campaign_cache_ttl_secs);
        let search_ttl = Duration::from_secs(retrieval.search_cache_ttl_secs);

        let embeddings = EmbeddingCache::new(
            backends.embedder.clone(),
            backends.cache.clone(),
            Duration::from_secs(config.embeddings.cache_ttl_secs),
        );
        let resolver = CampaignResolver::new(
            backends.projects.clone(),
            backends.cache.clone(),
            campaign_ttl,
            campaign_ttl + search_ttl,
        );

        let orchestrator = BatchOrchestrator::new(
            backends.content.clone(),
            backends.tracking.clone(),
            embeddings.clone(),
            VectorUpserter::new(
                backends.vectors.clone(),
                config.collection(),
                config.vector_store.max_content_chars,
            ),
            RecordValidator::from_config(&config.ingestion),
            Some(SearchCacheInvalidator::new(backends.cache.clone())),
            config.ingestion.max_concurrency,
        );
        let search = SearchEngine::new(
            resolver.clone(),
            embeddings,
            backends.vectors.clone(),
            backends.cache.clone(),
            config.collection(),
            config.retrieval.clone(),
        );
        let facets = FacetEngine::new(
            resolver,
            backends.vectors.clone(),
            config.collection(),
            DEFAULT_FACET_LIMIT,
        );
        let recovery = RecoveryJobs::new(backends.tracking);

        Self {
            config,
            database: None,
            orchestrator,
            search,
            facets,
            recovery,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Set when built by [`KnowRag::from_config`]
    pub fn database(&self) -> Option<&Database> {
        self.database.as_deref()
    }

    /// Create the PostgreSQL schema for the configured embedding dimension
    pub async fn init_schema(&self) -> Result<()> {
        let database = self.database.as_ref().ok_or_else(|| {
            KnowRagError::ConfigError("no database attached to this instance".to_string())
        })?;
        database.init_schema(self.config.embedding_dimension()).await
    }

    pub async fn ingest(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        self.orchestrator.run(request, cancel).await
    }

    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutput> {
        self.search.search(request, cancel).await
    }

    pub async fn aggregate(
        &self,
        campaign_id: &str,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<CampaignAggregate> {
        self.facets.aggregate(campaign_id, filters, cancel).await
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    pub fn recovery(&self) -> &RecoveryJobs {
        &self.recovery
    }
}
