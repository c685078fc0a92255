//! Build and search configuration.
//!
//! Both option structs deserialize with defaults for every missing field, so
//! the embedding application can keep them in its own config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options for `IndexBuilder`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    /// Discriminating length of the bucketing function (0 = single bucket).
    pub prefix_len: usize,
    /// Highest tolerated share of rejected raw entries, in `0.0..=1.0`.
    pub max_rejection_rate: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            prefix_len: 1,
            max_rejection_rate: 0.05,
        }
    }
}

/// Which buckets may contribute substring (tier 1) matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubstringScope {
    /// Only the buckets that can hold a prefix match are loaded, so
    /// substring matches starting in other buckets are missed.
    PrefixBuckets,
    /// Every bucket of the corpus is searched for substring matches.
    #[default]
    Corpus,
}

/// Options for `SymbolSearchManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub substring_scope: SubstringScope,
    /// Cap on delivered hits; ranking always runs over the full match set.
    pub max_results: Option<usize>,
    /// How long a search waits for one shard before treating it as unavailable.
    pub load_timeout_ms: Option<u64>,
    /// Filter the previous query's matches when the new query extends it.
    pub narrowing: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            substring_scope: SubstringScope::Corpus,
            max_results: None,
            load_timeout_ms: None,
            narrowing: true,
        }
    }
}

impl SearchOptions {
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}
