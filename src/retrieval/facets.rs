//! Campaign-wide counts and facets, computed by the vector store

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::filters::build_filter;
use super::filters::SearchFilters;
use super::resolver::CampaignResolver;
use crate::cancellable;
use crate::vector::Condition;
use crate::vector::FacetField;
use crate::vector::FacetHit;
use crate::vector::VectorStore;
use crate::Result;

pub const DEFAULT_FACET_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignAggregate {
    pub campaign_id: String,
    pub partitions: Vec<String>,
    pub total_count: u64,
    pub sentiments: Vec<FacetHit>,
    pub platforms: Vec<FacetHit>,
    /// Aspects mentioned by negative documents, most frequent first
    pub top_negative_aspects: Vec<FacetHit>,
    pub elapsed_ms: u64,
}

/// Aggregates over every indexed document of a campaign, not just a result page
#[derive(Clone)]
pub struct FacetEngine {
    resolver: CampaignResolver,
    store: Arc<dyn VectorStore>,
    collection: String,
    facet_limit: usize,
}

impl FacetEngine {
    pub fn new(
        resolver: CampaignResolver,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        facet_limit: usize,
    ) -> Self {
        Self {
            resolver,
            store,
            collection: collection.into(),
            facet_limit: facet_limit.max(1),
        }
    }

    pub async fn aggregate(
        &self,
        campaign_id: &str,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<CampaignAggregate> {
        let started = Instant::now();
        let partitions = cancellable(cancel, self.resolver.resolve(campaign_id)).await?;
        let filter = build_filter(&partitions, filters)?;
        let negative = filter
            .clone()
            .must(Condition::match_any("overall_sentiment", ["NEGATIVE"]));

        let sentiment_field = FacetField::field("overall_sentiment");
        let platform_field = FacetField::field("platform");
        let aspect_field = FacetField::nested("aspects", "aspect");

        let (total_count, sentiments, platforms, top_negative_aspects) = cancellable(cancel, async {
            tokio::try_join!(
                self.store.count(&self.collection, &filter),
                self.store
                    .facet(&self.collection, &sentiment_field, &filter, self.facet_limit),
                self.store
                    .facet(&self.collection, &platform_field, &filter, self.facet_limit),
                self.store
                    .facet(&self.collection, &aspect_field, &negative, self.facet_limit),
            )
        })
        .await?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Aggregated campaign {}: {} documents across {} partitions in {}ms",
            campaign_id,
            total_count,
            partitions.len(),
            elapsed_ms
        );

        Ok(CampaignAggregate {
            campaign_id: campaign_id.to_string(),
            partitions,
            total_count,
            sentiments,
            platforms,
            top_negative_aspects,
            elapsed_ms,
        })
    }
}
