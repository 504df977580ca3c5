//! Search-result cache invalidation by partition
//!
//! Result entries are keyed by campaign, ingestion knows partitions. The
//! resolver records `partition_campaigns:<partition>` -> campaign IDs whenever it
//! resolves a campaign, and invalidation walks that index to drop every
//! `search:<campaign>:` entry of the affected campaigns.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache;
use crate::cache::CacheStore;
use crate::Result;

pub fn partition_index_key(partition_id: &str) -> String {
    format!("partition_campaigns:{partition_id}")
}

pub fn search_key_prefix(campaign_id: &str) -> String {
    format!("search:{campaign_id}:")
}

#[derive(Clone)]
pub struct SearchCacheInvalidator {
    cache: Arc<dyn CacheStore>,
}

impl SearchCacheInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Remember that `campaign_id` covers `partitions`; best-effort
    pub async fn register(&self, campaign_id: &str, partitions: &[String], ttl: Duration) {
        for partition in partitions {
            let key = partition_index_key(partition);
            let mut campaigns: BTreeSet<String> = cache::get_json(self.cache.as_ref(), &key)
                .await
                .unwrap_or_default();
            if campaigns.insert(campaign_id.to_string()) {
                cache::set_json(self.cache.as_ref(), &key, &campaigns, ttl).await;
            }
        }
    }

    /// Drop cached search results of every campaign known to cover `partition_id`.
    ///
    /// Returns the number of cache entries removed.
    pub async fn invalidate_partition(&self, partition_id: &str) -> Result<u64> {
        let key = partition_index_key(partition_id);
        let campaigns: BTreeSet<String> = match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => return Ok(0),
        };

        let mut removed = 0;
        for campaign in &campaigns {
            removed += self.cache.delete_prefix(&search_key_prefix(campaign)).await?;
        }
        debug!(
            "Invalidated {} search entries for partition {} ({} campaigns)",
            removed,
            partition_id,
            campaigns.len()
        );
        Ok(removed)
    }
}
