//! Key-value cache abstraction
//!
//! Three independent caches share one [`CacheStore`]:
//! - `embedding:<fingerprint>`: query and content vectors
//! - `campaign_projects:<campaign>`: campaign to partition mapping
//! - `search:<campaign>:<hash>`: complete search responses
//!
//! Every cache interaction on the request path is best-effort: the helpers in
//! this module log and swallow store failures, so a broken cache behaves like an
//! empty one.

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;
use crate::Result;

/// Storage backend for cached JSON values
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Read and decode a cached value; failures and undecodable entries count as a miss
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        },
        Ok(None) => {
            debug!("Cache miss: {}", key);
            None
        }
        Err(e) => {
            warn!("Cache read failed for {}, treating as miss: {}", key, e);
            None
        }
    }
}

/// Encode and store a value; failures are logged and dropped
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to encode cache entry {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = cache.set(key, &raw, ttl).await {
        warn!("Cache write failed for {}: {}", key, e);
    }
}
