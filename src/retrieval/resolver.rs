//! Campaign to partition resolution

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use tracing::debug;

use super::invalidation::SearchCacheInvalidator;
use crate::cache;
use crate::cache::CacheStore;
use crate::config::ProjectServiceConfig;
use crate::models::Campaign;
use crate::KnowRagError;
use crate::Result;

pub fn campaign_cache_key(campaign_id: &str) -> String {
    format!("campaign_projects:{campaign_id}")
}

/// Source of truth for campaigns
#[async_trait]
pub trait ProjectService: Send + Sync {
    /// `None` when the campaign does not exist
    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>>;
}

/// [`ProjectService`] over the project service REST API
pub struct HttpProjectService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpProjectService {
    pub fn from_config(config: &ProjectServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KnowRagError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ProjectService for HttpProjectService {
    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let url = format!("{}/campaigns/{}", self.endpoint, campaign_id);
        debug!("Fetching campaign from {}", url);

        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| KnowRagError::HttpError(format!("project service: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(KnowRagError::HttpError(format!(
                "project service returned {status}: {body}"
            )));
        }

        let campaign = response
            .json::<Campaign>()
            .await
            .map_err(|e| KnowRagError::HttpError(format!("invalid campaign response: {e}")))?;
        Ok(Some(campaign))
    }
}

/// Cache-aside resolver every partition-scoped operation goes through
#[derive(Clone)]
pub struct CampaignResolver {
    service: Arc<dyn ProjectService>,
    cache: Arc<dyn CacheStore>,
    invalidator: SearchCacheInvalidator,
    ttl: Duration,
    index_ttl: Duration,
}

impl CampaignResolver {
    /// `index_ttl` bounds the partition -> campaign index and must outlive any
    /// search result cached from this resolution
    pub fn new(
        service: Arc<dyn ProjectService>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
        index_ttl: Duration,
    ) -> Self {
        Self {
            service,
            invalidator: SearchCacheInvalidator::new(cache.clone()),
            cache,
            ttl,
            index_ttl,
        }
    }

    /// Partition IDs of a campaign, in service order without duplicates
    pub async fn resolve(&self, campaign_id: &str) -> Result<Vec<String>> {
        if campaign_id.trim().is_empty() {
            return Err(KnowRagError::Validation("campaign id is required".to_string()));
        }

        let key = campaign_cache_key(campaign_id);
        if let Some(partitions) = cache::get_json::<Vec<String>>(self.cache.as_ref(), &key).await {
            if !partitions.is_empty() {
                return Ok(partitions);
            }
        }

        let campaign = self
            .service
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| KnowRagError::CampaignNotFound(campaign_id.to_string()))?;

        let mut partitions: Vec<String> = Vec::with_capacity(campaign.project_ids.len());
        for id in campaign.project_ids {
            if !id.trim().is_empty() && !partitions.contains(&id) {
                partitions.push(id);
            }
        }
        if partitions.is_empty() {
            return Err(KnowRagError::CampaignNoProjects(campaign_id.to_string()));
        }

        debug!(
            "Campaign {} resolved to {} partitions",
            campaign_id,
            partitions.len()
        );
        cache::set_json(self.cache.as_ref(), &key, &partitions, self.ttl).await;
        self.invalidator
            .register(campaign_id, &partitions, self.index_ttl)
            .await;
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::tests::FakeProjectService;

    fn resolver(service: Arc<FakeProjectService>, cache: Arc<MemoryCache>) -> CampaignResolver {
        CampaignResolver::new(
            service,
            cache,
            Duration::from_secs(600),
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn test_resolve_caches_mapping() {
        let service = Arc::new(FakeProjectService::new());
        service.add_campaign("camp", &["p1", "p2", "p1"]);
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(service.clone(), cache.clone());

        assert_eq!(resolver.resolve("camp").await.unwrap(), ["p1", "p2"]);
        assert_eq!(resolver.resolve("camp").await.unwrap(), ["p1", "p2"]);
        assert_eq!(service.calls(), 1);
        assert!(cache
            .get("partition_campaigns:p2")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_unknown_and_empty_campaigns() {
        let service = Arc::new(FakeProjectService::new());
        service.add_campaign("empty", &[]);
        let resolver = resolver(service.clone(), Arc::new(MemoryCache::new()));

        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, KnowRagError::CampaignNotFound(_)));

        let err = resolver.resolve("empty").await.unwrap_err();
        assert!(matches!(err, KnowRagError::CampaignNoProjects(_)));
        // Terminal answers are not cached
        let _ = resolver.resolve("empty").await;
        assert_eq!(service.calls(), 3);

        assert!(resolver.resolve(" ").await.is_err());
    }
}
