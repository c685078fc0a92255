//! Index building and shard store persistence.
//!
//! This module handles the build-time side of the engine:
//! - Collapsing raw entries into deduplicated symbol records
//! - Partitioning records into bucketed shards
//! - Writing stores to disk (directory layout or packed archive)

mod build;
mod persistence;
mod store;

// Re-export main types
pub use build::{BuildReport, BuiltCorpus, IndexBuilder, RejectedEntry};
pub use persistence::{read_manifest, read_packed, MANIFEST_FILE, PACKED_STORE_VERSION};
pub use store::{ManifestBucket, ShardStore, StoreManifest, STORE_FORMAT_VERSION};
