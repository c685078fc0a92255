//! Core record and result types.
//!
//! Field names serialize in camelCase because the result types cross the
//! boundary to the presenter.

use serde::{Deserialize, Serialize};

use crate::bucket::BucketId;
use crate::corpus::CorpusId;

/// A pointer to one documented anchor.
///
/// `(page_ref, fragment)` is opaque; the engine only compares it for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub page_ref: String,
    pub fragment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambiguator: Option<String>,
}

impl Location {
    pub fn new(page_ref: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            page_ref: page_ref.into(),
            fragment: fragment.into(),
            disambiguator: None,
        }
    }

    pub fn with_disambiguator(mut self, disambiguator: impl Into<String>) -> Self {
        self.disambiguator = Some(disambiguator.into());
        self
    }
}

/// One raw symbol entry as produced by a symbol extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    /// Search key before normalization (may carry case and markup).
    pub key: String,
    pub display_name: String,
    pub location: Location,
}

impl RawEntry {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>, location: Location) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            location,
        }
    }
}

/// A deduplicated symbol: every overload of one fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    /// Normalized search key, used only for matching.
    pub key: String,
    pub display_name: String,
    /// Declaration order, as produced by the extractor.
    pub locations: Vec<Location>,
}

impl SymbolRecord {
    /// Total order used inside shards and for tie-breaking results.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.key.as_str(), self.display_name.as_str())
    }
}

/// How a record matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    /// The key starts with the query.
    Prefix = 0,
    /// The key contains the query but does not start with it.
    Substring = 1,
}

/// One entry of the ordered result list handed to the presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedResult {
    pub key: String,
    pub display_name: String,
    pub tier: MatchTier,
    pub locations: Vec<Location>,
}

impl GroupedResult {
    pub fn from_record(record: &SymbolRecord, tier: MatchTier) -> Self {
        Self {
            key: record.key.clone(),
            display_name: record.display_name.clone(),
            tier,
            locations: record.locations.clone(),
        }
    }
}

/// Results of one live search generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// The corpus that answered the query.
    pub corpus: CorpusId,
    /// The query as typed.
    pub query: String,
    /// The query after normalization.
    pub normalized_query: String,
    /// Generation this result belongs to.
    pub generation: u64,
    /// Ranked matches (possibly truncated).
    pub hits: Vec<GroupedResult>,
    /// Total number of matches before truncation.
    pub count: usize,
    /// Whether `hits` was cut at the configured maximum.
    pub truncated: bool,
    /// Number of records examined.
    pub scanned: usize,
    /// Buckets that could not be loaded and contributed nothing.
    pub unavailable_buckets: Vec<BucketId>,
    /// Whether the result was computed by filtering the previous generation's matches.
    pub narrowed: bool,
}
