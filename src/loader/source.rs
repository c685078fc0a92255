//! Where shard payloads come from.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bucket::BucketId;
use crate::error::LoadError;
use crate::indexer::StoreManifest;

/// Fetches the raw payload of one bucket. Parsing happens in the loader.
#[async_trait]
pub trait ShardSource: Send + Sync {
    async fn fetch(&self, bucket: &BucketId) -> Result<String, LoadError>;
}

pub type SharedShardSource = Arc<dyn ShardSource>;

/// Reads shard payloads from a store directory.
///
/// File names come from the manifest; buckets it does not list fall back to
/// `<bucket>.js`.
#[derive(Debug, Clone)]
pub struct DirectoryShardSource {
    root: PathBuf,
    files: BTreeMap<BucketId, String>,
}

impl DirectoryShardSource {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: BTreeMap::new(),
        }
    }

    pub fn for_manifest(root: PathBuf, manifest: &StoreManifest) -> Self {
        let files = manifest
            .buckets
            .iter()
            .map(|bucket| (bucket.id.clone(), bucket.file.clone()))
            .collect();
        Self { root, files }
    }
}

#[async_trait]
impl ShardSource for DirectoryShardSource {
    async fn fetch(&self, bucket: &BucketId) -> Result<String, LoadError> {
        let path = match self.files.get(bucket) {
            Some(file) => self.root.join(file),
            None => self.root.join(bucket.file_name()),
        };
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| LoadError::io(path.display().to_string(), &error))
    }
}

/// Serves payloads held in memory, e.g. straight from a build or a packed store.
#[derive(Debug, Clone, Default)]
pub struct MemoryShardSource {
    payloads: BTreeMap<BucketId, String>,
}

impl MemoryShardSource {
    pub fn new(payloads: BTreeMap<BucketId, String>) -> Self {
        Self { payloads }
    }
}

#[async_trait]
impl ShardSource for MemoryShardSource {
    async fn fetch(&self, bucket: &BucketId) -> Result<String, LoadError> {
        self.payloads
            .get(bucket)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                target: bucket.file_name(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_store;

    #[tokio::test]
    async fn directory_source_reads_bucket_files() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(temp.path().join("p.js"), "var searchData=[];").expect("write");
        let source = DirectoryShardSource::new(temp.path().to_path_buf());

        let payload = source.fetch(&BucketId::new("p")).await.expect("fetch");
        assert_eq!(payload, "var searchData=[];");

        let error = source.fetch(&BucketId::new("q")).await.expect_err("missing");
        assert!(matches!(error, LoadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_source_follows_manifest_file_names() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let mut manifest = sample_store().manifest().clone();
        let bucket = manifest.buckets[0].id.clone();
        manifest.buckets[0].file = "shard-0.js".to_string();
        std::fs::write(temp.path().join("shard-0.js"), "var searchData=[];").expect("write");

        let source = DirectoryShardSource::for_manifest(temp.path().to_path_buf(), &manifest);
        let payload = source.fetch(&bucket).await.expect("fetch");
        assert_eq!(payload, "var searchData=[];");
    }

    #[tokio::test]
    async fn memory_source_reports_unknown_buckets() {
        let source = MemoryShardSource::default();
        let error = source.fetch(&BucketId::new("p")).await.expect_err("missing");
        assert_eq!(
            error,
            LoadError::NotFound {
                target: "p.js".to_string()
            }
        );
    }
}
