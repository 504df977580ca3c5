//! Redis-backed [`CacheStore`]

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::CacheStore;
use crate::config::RedisConfig;
use crate::KnowRagError;
use crate::Result;

const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    namespace: String,
}

impl RedisCache {
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| KnowRagError::Cache(format!("Redis open error: {e}")))?;

        Ok(Self {
            client,
            namespace: config.namespace.clone(),
        })
    }

    fn key(&self, k: &str) -> String {
        format!("{}{}", self.namespace, k)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| KnowRagError::Cache(format!("Redis connect error: {e}")))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let val: Option<String> = conn
            .get(self.key(key))
            .await
            .map_err(|e| KnowRagError::Cache(format!("Redis GET error: {e}")))?;
        Ok(val)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let k = self.key(key);
        let mut conn = self.connection().await?;
        redis::pipe()
            .set(&k, value)
            .ignore()
            .expire(&k, ttl.as_secs().max(1) as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| KnowRagError::Cache(format!("Redis SET/EXPIRE error: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.key(key))
            .await
            .map_err(|e| KnowRagError::Cache(format!("Redis DEL error: {e}")))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", escape_glob(&self.key(prefix)));
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| KnowRagError::Cache(format!("Redis SCAN error: {e}")))?;

            if !keys.is_empty() {
                let deleted: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| KnowRagError::Cache(format!("Redis DEL error: {e}")))?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

/// Escape Redis glob metacharacters so `s` matches only itself in `MATCH`
fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
