//! Corpora: one independently built, independently queried symbol collection.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketId, BucketTable};
use crate::error::{BuildError, LoadError};
use crate::indexer::{read_manifest, read_packed, ShardStore, StoreManifest};
use crate::loader::{DirectoryShardSource, MemoryShardSource, SharedShardSource};

/// Identity of a corpus root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusId(String);

impl CorpusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an id, rejecting blank values.
    pub fn parse(id: &str) -> Result<Self, BuildError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(BuildError::InvalidCorpusId(format!("{id:?} is blank")));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorpusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A corpus' manifest plus the source its shards are fetched from.
///
/// Corpora never share records, buckets, or caches; locations are only
/// meaningful relative to the corpus that returned them.
#[derive(Clone)]
pub struct Corpus {
    manifest: StoreManifest,
    source: SharedShardSource,
}

impl fmt::Debug for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Corpus")
            .field("manifest", &self.manifest)
            .field("source", &"<shard source>")
            .finish()
    }
}

impl Corpus {
    pub fn new(manifest: StoreManifest, source: SharedShardSource) -> Self {
        Self { manifest, source }
    }

    /// Serves shards straight from a freshly built store.
    pub fn from_store(store: ShardStore) -> Self {
        let (manifest, payloads) = store.into_parts();
        Self::new(manifest, Arc::new(MemoryShardSource::new(payloads)))
    }

    /// Opens a store directory written by `ShardStore::write_dir`.
    pub async fn open_dir(dir: &Path) -> Result<Self, LoadError> {
        let manifest = read_manifest(dir).await?;
        let source = DirectoryShardSource::for_manifest(dir.to_path_buf(), &manifest);
        Ok(Self::new(manifest, Arc::new(source)))
    }

    /// Opens a packed store written by `ShardStore::write_packed`.
    pub fn open_packed(path: &Path) -> Result<Self, LoadError> {
        Ok(Self::from_store(read_packed(path)?))
    }

    pub fn id(&self) -> &CorpusId {
        &self.manifest.corpus_id
    }

    pub fn table(&self) -> &BucketTable {
        &self.manifest.table
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub fn source(&self) -> &SharedShardSource {
        &self.source
    }

    pub fn bucket_ids(&self) -> impl Iterator<Item = &BucketId> {
        self.manifest.buckets.iter().map(|bucket| &bucket.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SymbolSearchManager;
    use crate::test_support::sample_built;

    #[test]
    fn parse_rejects_blank_ids() {
        assert!(CorpusId::parse("  ").is_err());
        assert_eq!(CorpusId::parse(" loris18 ").expect("id").as_str(), "loris18");
    }

    #[tokio::test]
    async fn directory_store_serves_searches() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let built = sample_built();
        built.store.write_dir(temp.path()).expect("write");

        let corpus = Corpus::open_dir(temp.path()).await.expect("open");
        assert_eq!(corpus.manifest(), built.store.manifest());

        let manager = SymbolSearchManager::default();
        let id = manager.register(corpus).expect("register");
        let result = manager
            .search(&id, "chan")
            .await
            .expect("registered")
            .expect("live");
        let keys: Vec<_> = result.hits.iter().map(|hit| hit.key.as_str()).collect();
        assert_eq!(keys, vec!["channelize", "channelizer", "channels"]);
    }

    #[tokio::test]
    async fn directory_store_follows_manifest_file_names() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let (mut manifest, payloads) = sample_built().store.into_parts();
        for bucket in &mut manifest.buckets {
            bucket.file = format!("shard_{}.js", bucket.id);
        }
        ShardStore::new(manifest, payloads)
            .write_dir(temp.path())
            .expect("write");
        assert!(temp.path().join("shard_c.js").exists());
        assert!(!temp.path().join("c.js").exists());

        let manager = SymbolSearchManager::default();
        let corpus = Corpus::open_dir(temp.path()).await.expect("open");
        let id = manager.register(corpus).expect("register");
        let result = manager
            .search(&id, "chan")
            .await
            .expect("registered")
            .expect("live");
        assert_eq!(result.count, 3);
        assert!(result.unavailable_buckets.is_empty());
    }

    #[test]
    fn packed_store_opens_with_every_bucket() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("loris.bin.zst");
        let built = sample_built();
        built.store.write_packed(&path).expect("write");

        let corpus = Corpus::open_packed(&path).expect("open");
        assert_eq!(corpus.id().as_str(), "loris");
        assert_eq!(
            corpus.bucket_ids().count(),
            built.store.manifest().buckets.len()
        );
    }
}
