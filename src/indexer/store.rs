//! In-memory shard store: the manifest plus one serialized payload per bucket.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketId, BucketTable, BUCKET_TABLE_VERSION, MAX_PREFIX_LEN};
use crate::corpus::CorpusId;
use crate::error::LoadError;

/// Store layout version - increment when the manifest or payload layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// One non-empty bucket listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBucket {
    pub id: BucketId,
    pub file: String,
    pub records: usize,
}

/// Corpus-level metadata shared by the builder and the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreManifest {
    pub version: u32,
    pub corpus_id: CorpusId,
    pub table: BucketTable,
    /// Non-empty buckets, ordered by id.
    pub buckets: Vec<ManifestBucket>,
}

impl StoreManifest {
    /// Checks that the manifest was written by a compatible builder.
    pub fn validate(&self, target: &str) -> Result<(), LoadError> {
        if self.version != STORE_FORMAT_VERSION {
            return Err(LoadError::VersionMismatch {
                target: target.to_string(),
                found: self.version,
                expected: STORE_FORMAT_VERSION,
            });
        }
        if self.table.version() != BUCKET_TABLE_VERSION {
            return Err(LoadError::VersionMismatch {
                target: format!("{target} bucket table"),
                found: self.table.version(),
                expected: BUCKET_TABLE_VERSION,
            });
        }
        let escaping = self
            .buckets
            .iter()
            .find(|bucket| !is_plain_file_name(&bucket.file));
        if let Some(bucket) = escaping {
            return Err(LoadError::malformed(
                target,
                format!("bucket {} has file name {:?}", bucket.id, bucket.file),
            ));
        }
        if self.table.discriminating_len() > MAX_PREFIX_LEN {
            return Err(LoadError::malformed(
                target,
                format!("bucket prefix length {}", self.table.discriminating_len()),
            ));
        }
        Ok(())
    }

    pub fn bucket(&self, id: &BucketId) -> Option<&ManifestBucket> {
        self.buckets.iter().find(|bucket| &bucket.id == id)
    }

    pub fn total_records(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.records).sum()
    }
}

/// Shard files must sit directly inside the store directory.
fn is_plain_file_name(file: &str) -> bool {
    !file.is_empty() && file != "." && file != ".." && !file.contains(['/', '\\'])
}

/// Build output: manifest plus serialized shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStore {
    manifest: StoreManifest,
    payloads: BTreeMap<BucketId, String>,
}

impl ShardStore {
    pub fn new(manifest: StoreManifest, payloads: BTreeMap<BucketId, String>) -> Self {
        Self { manifest, payloads }
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub fn payload(&self, bucket: &BucketId) -> Option<&str> {
        self.payloads.get(bucket).map(String::as_str)
    }

    pub fn payloads(&self) -> impl Iterator<Item = (&BucketId, &str)> {
        self.payloads
            .iter()
            .map(|(bucket, payload)| (bucket, payload.as_str()))
    }

    pub fn into_parts(self) -> (StoreManifest, BTreeMap<BucketId, String>) {
        (self.manifest, self.payloads)
    }
}
