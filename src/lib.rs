//! Incremental symbol search over statically generated API-reference corpora.
//!
//! This crate provides the core search functionality:
//! - Index building: overload collapsing, bucketing, shard serialization
//! - Shard stores on disk (directory or packed, compressed)
//! - Lazy shard loading with a per-corpus cache and coalesced fetches
//! - Prefix/substring matching and ranking with stale-result suppression
//! - Import of Doxygen search data

pub mod bucket;
pub mod cancel;
pub mod corpus;
pub mod error;
pub mod import;
pub mod indexer;
pub mod loader;
pub mod normalize;
pub mod options;
pub mod search;
pub mod shard;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use bucket::{BucketId, BucketTable};
pub use cancel::{CancellationToken, GenerationTracker};
pub use corpus::{Corpus, CorpusId};
pub use error::{BuildError, LoadError, PartialParseError, RejectReason, SearchError};
pub use import::{import_dir, import_file, parse_search_data};
pub use indexer::{BuildReport, BuiltCorpus, IndexBuilder, ShardStore, StoreManifest};
pub use loader::{
    DirectoryShardSource, LoaderStats, MemoryShardSource, ShardLoader, ShardSource,
    SharedShardSource,
};
pub use options::{BuildOptions, SearchOptions, SubstringScope};
pub use search::{PendingSearch, Presenter, QuerySession, SymbolSearchManager};
pub use shard::Shard;
pub use types::{GroupedResult, Location, MatchTier, RawEntry, SearchResult, SymbolRecord};
