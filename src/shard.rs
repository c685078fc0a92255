//! Shards: immutable, independently loadable partitions of a corpus.

pub mod codec;

use crate::bucket::BucketId;
use crate::types::SymbolRecord;

pub use codec::{decode_shard, encode_shard, DecodedShard, SHARD_VARIABLE};

/// One bucket's records, sorted by `(key, display_name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    bucket: BucketId,
    records: Vec<SymbolRecord>,
}

impl Shard {
    /// Creates a shard, sorting records into canonical order.
    pub fn new(bucket: BucketId, mut records: Vec<SymbolRecord>) -> Self {
        if !is_sorted(&records) {
            records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        Self { bucket, records }
    }

    pub fn bucket(&self) -> &BucketId {
        &self.bucket
    }

    pub fn records(&self) -> &[SymbolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<SymbolRecord> {
        self.records
    }
}

pub(crate) fn is_sorted(records: &[SymbolRecord]) -> bool {
    records
        .windows(2)
        .all(|pair| pair[0].sort_key() <= pair[1].sort_key())
}
