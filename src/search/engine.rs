//! Matching and ranking over loaded shards.

use std::cmp::Ordering;
use std::sync::Arc;

use memchr::memmem;

use crate::bucket::{BucketId, BucketTable};
use crate::cancel::CancellationToken;
use crate::shard::Shard;
use crate::types::{GroupedResult, MatchTier, SymbolRecord};

/// Classifies keys against one normalized query.
pub(crate) struct QueryMatcher<'q> {
    query: &'q str,
    finder: memmem::Finder<'q>,
}

impl<'q> QueryMatcher<'q> {
    pub(crate) fn new(query: &'q str) -> Self {
        Self {
            query,
            finder: memmem::Finder::new(query.as_bytes()),
        }
    }

    #[inline]
    pub(crate) fn tier(&self, key: &str) -> Option<MatchTier> {
        if key.starts_with(self.query) {
            Some(MatchTier::Prefix)
        } else if self.finder.find(key.as_bytes()).is_some() {
            Some(MatchTier::Substring)
        } else {
            None
        }
    }
}

/// Ranked matches of one query, before truncation.
#[derive(Debug, Clone, Default)]
pub(crate) struct RankedMatches {
    pub(crate) hits: Vec<GroupedResult>,
    pub(crate) scanned: usize,
}

/// Result order: tier, then key, then display name.
pub(crate) fn compare_hits(a: &GroupedResult, b: &GroupedResult) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| a.key.cmp(&b.key))
        .then_with(|| a.display_name.cmp(&b.display_name))
}

/// Matches every record of `shards`. Returns `None` once `token` is superseded.
pub(crate) fn rank_shards(
    shards: &[Arc<Shard>],
    query: &str,
    token: &CancellationToken,
) -> Option<RankedMatches> {
    let matcher = QueryMatcher::new(query);
    let mut matched: Vec<(MatchTier, &SymbolRecord)> = Vec::new();
    let mut scanned = 0usize;

    for shard in shards {
        for record in shard.records() {
            token.ensure_live_sparse(scanned)?;
            scanned += 1;
            if let Some(tier) = matcher.tier(&record.key) {
                matched.push((tier, record));
            }
        }
    }

    matched.sort_unstable_by(|(tier_a, a), (tier_b, b)| {
        tier_a.cmp(tier_b).then_with(|| a.sort_key().cmp(&b.sort_key()))
    });
    token.ensure_live()?;

    Some(RankedMatches {
        hits: matched
            .into_iter()
            .map(|(tier, record)| GroupedResult::from_record(record, tier))
            .collect(),
        scanned,
    })
}

/// Re-matches the complete matches of an earlier query that `query` extends.
///
/// Any key containing `query` also contains the earlier query, so filtering
/// that match set yields the same hits as a full scan. Records outside
/// `buckets` are dropped so the result stays confined to the buckets a full
/// scan would have loaded.
pub(crate) fn narrow_matches(
    previous: &[GroupedResult],
    query: &str,
    table: &BucketTable,
    buckets: Option<&[BucketId]>,
    token: &CancellationToken,
) -> Option<RankedMatches> {
    let matcher = QueryMatcher::new(query);
    let mut hits = Vec::new();

    for (index, hit) in previous.iter().enumerate() {
        token.ensure_live_sparse(index)?;
        if let Some(buckets) = buckets {
            if !buckets.contains(&table.bucket(&hit.key)) {
                continue;
            }
        }
        if let Some(tier) = matcher.tier(&hit.key) {
            hits.push(GroupedResult {
                tier,
                ..hit.clone()
            });
        }
    }

    hits.sort_by(compare_hits);
    token.ensure_live()?;

    Some(RankedMatches {
        scanned: previous.len(),
        hits,
    })
}
