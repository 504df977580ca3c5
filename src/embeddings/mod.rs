//! Embeddings generation module
//!
//! Two layers:
//! - [`EmbeddingProvider`]: the raw capability, implemented over HTTP for
//!   `OpenAI`-compatible endpoints and Ollama by [`HttpEmbeddingClient`]
//! - [`EmbeddingCache`]: cache-aside gateway keyed by content fingerprint, used by
//!   both ingestion and query paths
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use knowrag::cache::MemoryCache;
//! use knowrag::config::AppConfig;
//! use knowrag::embeddings::EmbeddingCache;
//! use knowrag::embeddings::HttpEmbeddingClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let provider = Arc::new(HttpEmbeddingClient::from_config(&config.embeddings)?);
//!     let gateway = EmbeddingCache::new(provider, Arc::new(MemoryCache::new()), Duration::from_secs(3600));
//!
//!     let embedding = gateway.generate("Hello, world!").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;

pub use cache::EmbeddingCache;
pub use client::EmbeddingProvider;
pub use client::HttpEmbeddingClient;
pub use client::ProviderKind;

/// Default embedding dimension for `OpenAI` text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;
