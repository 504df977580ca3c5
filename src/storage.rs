//! Batch file access
//!
//! Batches are addressed as `s3://<bucket>/<key>`. The object store itself is an
//! external collaborator behind [`ContentStore`]; [`LocalContentStore`] maps
//! buckets onto directories for local runs and tests.

use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::KnowRagError;
use crate::Result;

/// Parsed `s3://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLocation {
    pub bucket: String,
    pub key: String,
}

impl BatchLocation {
    pub fn parse(location: &str) -> Result<Self> {
        let url = url::Url::parse(location)
            .map_err(|e| KnowRagError::Validation(format!("invalid batch location {location}: {e}")))?;

        if url.scheme() != "s3" {
            return Err(KnowRagError::Validation(format!(
                "batch location must use the s3:// scheme, got {}",
                url.scheme()
            )));
        }

        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| KnowRagError::Validation(format!("batch location {location} has no bucket")))?
            .to_string();
        let key = url.path().trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(KnowRagError::Validation(format!(
                "batch location {location} has no object key"
            )));
        }

        Ok(Self { bucket, key })
    }
}

impl fmt::Display for BatchLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Object storage capability
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Serves `bucket/key` from `root/bucket/key` on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        // Keys must stay inside the bucket directory
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(KnowRagError::Storage(format!(
                "object key escapes bucket: {bucket}/{key}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(bucket, key)?;
        debug!("Reading batch object from {}", path.display());
        tokio::fs::read(&path)
            .await
            .map_err(|e| KnowRagError::Storage(format!("failed to read {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let loc = BatchLocation::parse("s3://analytics/batches/2024/05/b1.jsonl").unwrap();
        assert_eq!(loc.bucket, "analytics");
        assert_eq!(loc.key, "batches/2024/05/b1.jsonl");
        assert_eq!(loc.to_string(), "s3://analytics/batches/2024/05/b1.jsonl");
    }

    #[test]
    fn test_parse_rejects_other_schemes_and_missing_parts() {
        assert!(BatchLocation::parse("https://analytics/b1.jsonl").is_err());
        assert!(BatchLocation::parse("s3://analytics/").is_err());
        assert!(BatchLocation::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_local_store_reads_bucket_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bucket/nested")).unwrap();
        std::fs::write(dir.path().join("bucket/nested/b.jsonl"), b"{}\n").unwrap();

        let store = LocalContentStore::new(dir.path());
        let bytes = store.download("bucket", "nested/b.jsonl").await.unwrap();
        assert_eq!(bytes, b"{}\n");

        assert!(store.download("bucket", "missing.jsonl").await.is_err());
        assert!(store.download("bucket", "../outside").await.is_err());
    }
}
