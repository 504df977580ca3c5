//! Cache-aside embedding gateway

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use super::EmbeddingProvider;
use crate::cache;
use crate::cache::CacheStore;
use crate::errors::EmbeddingError;
use crate::fingerprint::content_fingerprint;
use crate::Result;

const KEY_PREFIX: &str = "embedding:";

/// Cache key of the vector for `text`
pub fn embedding_cache_key(text: &str) -> String {
    format!("{KEY_PREFIX}{}", content_fingerprint(text))
}

/// Embedding generation with a fingerprint-keyed cache in front of the provider
#[derive(Clone)]
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            ttl,
        }
    }

    /// Embed a single text
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput.into());
        }

        let key = embedding_cache_key(text);
        if let Some(vector) = cache::get_json::<Vec<f32>>(self.cache.as_ref(), &key).await {
            return Ok(vector);
        }

        let start = Instant::now();
        let mut vectors = self.provider.embed(&[text.to_string()]).await?;
        let vector = match vectors.len() {
            0 => return Err(EmbeddingError::NoVectorReturned.into()),
            1 => vectors.remove(0),
            n => {
                return Err(EmbeddingError::CountMismatch {
                    expected: 1,
                    actual: n,
                }
                .into())
            }
        };
        if vector.is_empty() {
            return Err(EmbeddingError::NoVectorReturned.into());
        }
        debug!(
            "Generated embedding with {} ({} dims) in {:?}",
            self.provider.model_name(),
            vector.len(),
            start.elapsed()
        );

        cache::set_json(self.cache.as_ref(), &key, &vector, self.ttl).await;
        Ok(vector)
    }

    /// Embed many texts; the result is positionally aligned with `texts`.
    ///
    /// Only cache misses reach the provider, in a single request. Either every
    /// position is filled or an error is returned.
    pub async fn generate_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput.into());
        }

        let keys: Vec<String> = texts.iter().map(|t| embedding_cache_key(t)).collect();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let hit = cache::get_json::<Vec<f32>>(self.cache.as_ref(), key).await;
            if hit.is_none() {
                misses.push(i);
            }
            slots.push(hit);
        }

        debug!(
            "Embedding batch: {} texts, {} cache hits",
            texts.len(),
            texts.len() - misses.len()
        );

        if !misses.is_empty() {
            let request: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let generated = self.provider.embed(&request).await?;
            if generated.is_empty() {
                return Err(EmbeddingError::NoVectorReturned.into());
            }
            if generated.len() != request.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: request.len(),
                    actual: generated.len(),
                }
                .into());
            }

            for (&i, vector) in misses.iter().zip(generated) {
                if vector.is_empty() {
                    return Err(EmbeddingError::NoVectorReturned.into());
                }
                cache::set_json(self.cache.as_ref(), &keys[i], &vector, self.ttl).await;
                slots[i] = Some(vector);
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| EmbeddingError::NoVectorReturned.into()))
            .collect()
    }
}
