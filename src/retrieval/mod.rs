//! Retrieval
//!
//! Every query is scoped to a campaign: the [`resolver`] maps it onto partitions,
//! [`filters`] turns user filters into a store filter, and [`search`] or
//! [`facets`] answer it. Search responses are cached per campaign and dropped by
//! [`invalidation`] when ingestion touches one of the campaign's partitions.

pub mod aggregator;
pub mod facets;
pub mod filters;
pub mod invalidation;
pub mod resolver;
pub mod search;

pub use aggregator::aggregate;
pub use aggregator::Aggregations;
pub use aggregator::AspectStat;
pub use aggregator::Bucket;
pub use facets::CampaignAggregate;
pub use facets::FacetEngine;
pub use filters::build_filter;
pub use filters::SearchFilters;
pub use invalidation::SearchCacheInvalidator;
pub use resolver::CampaignResolver;
pub use resolver::HttpProjectService;
pub use resolver::ProjectService;
pub use search::SearchEngine;
pub use search::SearchHit;
pub use search::SearchOutput;
pub use search::SearchRequest;
