//! The bucketing contract shared by the index builder and the shard loader.
//!
//! A `BucketTable` is persisted in the store manifest and is never re-derived
//! from file names at query time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Version of the bucketing function. Increment when `bucket()` changes.
pub const BUCKET_TABLE_VERSION: u32 = 1;

/// Largest supported discriminating length.
pub const MAX_PREFIX_LEN: usize = 4;

/// Class shared by every non-alphabetic character.
pub const OVERFLOW_CLASS: char = '_';

/// Bucket id used when the table does not discriminate at all.
const SINGLE_BUCKET: &str = "all";

/// Identifier of one shard within a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

impl BucketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this bucket's shard payload inside a store directory.
    pub fn file_name(&self) -> String {
        format!("{}.js", self.0)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic `bucket(key) -> BucketId` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketTable {
    version: u32,
    prefix_len: usize,
}

impl Default for BucketTable {
    fn default() -> Self {
        Self::first_char()
    }
}

impl BucketTable {
    pub fn new(prefix_len: usize) -> Result<Self, BuildError> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(BuildError::InvalidBucketTable(format!(
                "prefix length {prefix_len} exceeds {MAX_PREFIX_LEN}"
            )));
        }
        Ok(Self {
            version: BUCKET_TABLE_VERSION,
            prefix_len,
        })
    }

    /// One bucket per leading letter plus one overflow bucket.
    pub fn first_char() -> Self {
        Self {
            version: BUCKET_TABLE_VERSION,
            prefix_len: 1,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of leading characters that decide the bucket.
    pub fn discriminating_len(&self) -> usize {
        self.prefix_len
    }

    /// Maps a normalized key to its bucket.
    pub fn bucket(&self, key: &str) -> BucketId {
        BucketId(self.bucket_prefix(key))
    }

    fn bucket_prefix(&self, key: &str) -> String {
        if self.prefix_len == 0 {
            return SINGLE_BUCKET.to_string();
        }
        let mut chars = key.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {
                let mut prefix = String::with_capacity(self.prefix_len);
                prefix.push(first);
                prefix.extend(chars.take(self.prefix_len - 1).map(char_class));
                prefix
            }
            _ => OVERFLOW_CLASS.to_string(),
        }
    }

    /// Whether the bucket of `query` already pins every key starting with
    /// `query` to a single bucket.
    pub fn is_fully_discriminating(&self, query: &str) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        match query.chars().next() {
            Some(first) if first.is_ascii_lowercase() => {
                query.chars().count() >= self.prefix_len
            }
            _ => true,
        }
    }

    /// Buckets that can hold a key starting with `query`.
    ///
    /// `known` lists the non-empty buckets of the corpus; buckets missing from
    /// it hold no records and are never returned.
    pub fn prefix_candidates<'a, I>(&self, query: &str, known: I) -> Vec<BucketId>
    where
        I: IntoIterator<Item = &'a BucketId>,
    {
        let target = self.bucket_prefix(query);
        let exact = self.is_fully_discriminating(query);
        known
            .into_iter()
            .filter(|bucket| {
                if exact {
                    bucket.0 == target
                } else {
                    bucket.0.starts_with(target.as_str())
                }
            })
            .cloned()
            .collect()
    }
}

fn char_class(c: char) -> char {
    if c.is_ascii_lowercase() {
        c
    } else {
        OVERFLOW_CLASS
    }
}
