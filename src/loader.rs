//! Lazy shard loading with a per-corpus cache.
//!
//! A `ShardLoader` owns the cache for exactly one corpus:
//! - Cached shards are returned without suspending.
//! - Concurrent requests for a bucket share one in-flight fetch.
//! - Failures are returned to every waiter and never cached.
//! - Fetches run as detached tasks, so a superseded search never aborts
//!   useful work; the shard lands in the cache when it arrives.

mod source;

pub use source::{DirectoryShardSource, MemoryShardSource, ShardSource, SharedShardSource};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use fnv::FnvHashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::bucket::{BucketId, BucketTable};
use crate::corpus::{Corpus, CorpusId};
use crate::error::LoadError;
use crate::shard::{decode_shard, Shard};

type PendingLoad = Shared<BoxFuture<'static, Result<Arc<Shard>, LoadError>>>;

#[derive(Default)]
struct LoaderState {
    cached: FnvHashMap<BucketId, Arc<Shard>>,
    in_flight: FnvHashMap<BucketId, PendingLoad>,
}

#[derive(Debug, Default)]
struct LoaderCounters {
    fetches: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of a loader's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderStats {
    /// Fetches issued against the shard source.
    pub fetches: u64,
    /// Requests that attached to an already outstanding fetch.
    pub coalesced: u64,
    /// Fetches that ended in a `LoadError`.
    pub failures: u64,
    /// Shards currently cached.
    pub cached_shards: usize,
}

struct Inner {
    corpus: CorpusId,
    table: BucketTable,
    source: SharedShardSource,
    state: Mutex<LoaderState>,
    counters: LoaderCounters,
}

/// Loads and caches the shards of one corpus.
#[derive(Clone)]
pub struct ShardLoader {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShardLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardLoader")
            .field("corpus", &self.inner.corpus)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ShardLoader {
    pub fn new(corpus: CorpusId, table: BucketTable, source: SharedShardSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                corpus,
                table,
                source,
                state: Mutex::new(LoaderState::default()),
                counters: LoaderCounters::default(),
            }),
        }
    }

    pub fn for_corpus(corpus: &Corpus) -> Self {
        Self::new(
            corpus.id().clone(),
            *corpus.table(),
            corpus.source().clone(),
        )
    }

    pub fn corpus(&self) -> &CorpusId {
        &self.inner.corpus
    }

    /// Returns the cached shard for `bucket`, if it has been loaded.
    pub fn cached(&self, bucket: &BucketId) -> Option<Arc<Shard>> {
        self.inner.state.lock().cached.get(bucket).cloned()
    }

    /// Loads the shard for `bucket`, fetching it at most once at a time.
    ///
    /// Fetch tasks are spawned on the current tokio runtime when there is one;
    /// without a runtime the fetch is driven by the awaiting callers.
    pub async fn load(&self, bucket: &BucketId) -> Result<Arc<Shard>, LoadError> {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some(shard) = state.cached.get(bucket) {
                return Ok(shard.clone());
            }
            match state.in_flight.get(bucket) {
                Some(pending) => {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    pending.clone()
                }
                None => {
                    let pending = self.start_fetch(bucket.clone());
                    state.in_flight.insert(bucket.clone(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    pub fn stats(&self) -> LoaderStats {
        let counters = &self.inner.counters;
        LoaderStats {
            fetches: counters.fetches.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            cached_shards: self.inner.state.lock().cached.len(),
        }
    }

    fn start_fetch(&self, bucket: BucketId) -> PendingLoad {
        self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let fetch = fetch_shard(
            Arc::downgrade(&self.inner),
            self.inner.source.clone(),
            bucket.clone(),
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(fetch);
                async move {
                    task.await.unwrap_or_else(|error| {
                        Err(LoadError::Aborted {
                            target: bucket.file_name(),
                            message: error.to_string(),
                        })
                    })
                }
                .boxed()
                .shared()
            }
            Err(_) => fetch.boxed().shared(),
        }
    }
}

/// Clears the in-flight slot once a fetch finishes, panics included.
///
/// Fetch futures sit in the loader's own in-flight map, so they only hold a
/// weak reference back to it.
struct InFlightGuard {
    owner: Weak<Inner>,
    bucket: BucketId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            let finished = inner.state.lock().in_flight.remove(&self.bucket);
            drop(finished);
        }
    }
}

async fn fetch_shard(
    owner: Weak<Inner>,
    source: SharedShardSource,
    bucket: BucketId,
) -> Result<Arc<Shard>, LoadError> {
    let _guard = InFlightGuard {
        owner: owner.clone(),
        bucket: bucket.clone(),
    };
    let started = Instant::now();
    let fetched = source.fetch(&bucket).await;

    let Some(inner) = owner.upgrade() else {
        return Err(LoadError::Aborted {
            target: bucket.file_name(),
            message: "shard loader dropped".to_string(),
        });
    };

    let result = fetched.and_then(|payload| {
        decode_shard(&inner.table, &bucket, &payload).map(|decoded| {
            log::debug!(
                "loaded shard corpus={} bucket={} records={} skipped={} elapsed_ms={}",
                inner.corpus,
                bucket,
                decoded.shard.len(),
                decoded.skipped.len(),
                started.elapsed().as_millis()
            );
            Arc::new(decoded.shard)
        })
    });

    match &result {
        Ok(shard) => {
            inner
                .state
                .lock()
                .cached
                .insert(bucket.clone(), shard.clone());
        }
        Err(error) => {
            inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "shard load failed corpus={} bucket={} error={}",
                inner.corpus,
                bucket,
                error
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::normalize::{is_normalized_key, normalize_key};
    use crate::options::BuildOptions;
    use crate::test_support::{build_with, sample_entries, sample_store, GatedSource};
    use crate::types::{Location, RawEntry};

    fn loader_with(source: Arc<GatedSource>) -> ShardLoader {
        let store = sample_store();
        ShardLoader::new(
            store.manifest().corpus_id.clone(),
            store.manifest().table,
            source,
        )
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("c");

        let (first, second) = tokio::join!(loader.load(&bucket), loader.load(&bucket));
        let first = first.expect("first load");
        let second = second.expect("second load");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetch_count(&bucket), 1);
        let stats = loader.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.cached_shards, 1);
    }

    #[tokio::test]
    async fn cached_shard_is_returned_without_suspending() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("p");

        loader.load(&bucket).await.expect("load");
        assert!(loader.cached(&bucket).is_some());

        let again = loader.load(&bucket).now_or_never();
        assert!(matches!(again, Some(Ok(_))));
        assert_eq!(source.fetch_count(&bucket), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("c");

        source.fail_next(&bucket);
        let error = loader.load(&bucket).await.expect_err("injected failure");
        assert!(matches!(error, LoadError::Io { .. }));
        assert!(loader.cached(&bucket).is_none());

        let shard = loader.load(&bucket).await.expect("retry");
        assert!(!shard.is_empty());
        assert_eq!(source.fetch_count(&bucket), 2);
        assert_eq!(loader.stats().failures, 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_load_error() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let bucket = BucketId::new("c");
        source.set_payload(&bucket, "searchData = nothing");
        let loader = loader_with(source);

        let error = loader.load(&bucket).await.expect_err("malformed");
        assert!(matches!(error, LoadError::Malformed { .. }));
    }

    #[tokio::test]
    async fn fetch_completes_after_waiter_is_dropped() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("f");
        source.hold(&bucket);

        let waiter = tokio::spawn({
            let loader = loader.clone();
            let bucket = bucket.clone();
            async move { loader.load(&bucket).await }
        });
        source.wait_for_fetch(&bucket, 1).await;
        waiter.abort();

        source.release(&bucket);
        for _ in 0..100 {
            if loader.cached(&bucket).is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(loader.cached(&bucket).is_some());
        assert_eq!(source.fetch_count(&bucket), 1);
    }

    #[test]
    fn loads_without_a_runtime() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source);
        let shard = loader
            .load(&BucketId::new("c"))
            .now_or_never()
            .expect("memory fetch completes immediately")
            .expect("load");
        assert!(!shard.is_empty());
    }

    #[test]
    fn abandoned_fetch_resumes_on_the_next_load_without_a_runtime() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("c");
        source.hold(&bucket);

        let mut abandoned = Box::pin(loader.load(&bucket));
        assert!((&mut abandoned).now_or_never().is_none());
        drop(abandoned);

        source.release(&bucket);
        let shard = loader
            .load(&bucket)
            .now_or_never()
            .expect("released fetch completes")
            .expect("load");
        assert!(!shard.is_empty());
        assert_eq!(source.fetch_count(&bucket), 1);
        assert_eq!(loader.stats().coalesced, 1);
    }

    #[test]
    fn abandoned_fetch_does_not_keep_the_loader_alive() {
        let source = Arc::new(GatedSource::from_store(&sample_store()));
        let loader = loader_with(source.clone());
        let bucket = BucketId::new("c");
        source.hold(&bucket);

        let mut abandoned = Box::pin(loader.load(&bucket));
        assert!((&mut abandoned).now_or_never().is_none());
        drop(abandoned);

        let inner = Arc::downgrade(&loader.inner);
        drop(loader);
        assert!(inner.upgrade().is_none());
    }

    /// Keys mixing entities, markup, non-ASCII text and non-alphabetic leads.
    fn awkward_entries() -> Vec<RawEntry> {
        const LEADS: [&str; 8] = ["", "~", "_", "9", "\u{c9}", "&lt;", "<b>", " "];
        const STEMS: [&str; 8] = [
            "alpha",
            "Beta",
            "\u{e7}a",
            "\u{65e5}\u{672c}",
            "x&amp;lt;y",
            "&lt;i&gt;z",
            "op&amp;",
            "a<i>b</i>c",
        ];
        const TAILS: [&str; 5] = ["", "()", "&gt;", "\u{df}", "-1"];

        let mut entries = Vec::new();
        for lead in LEADS {
            for stem in STEMS {
                for tail in TAILS {
                    let key = format!("{lead}{stem}{tail}");
                    let fragment = format!("a{:x}", entries.len());
                    entries.push(RawEntry::new(
                        key.clone(),
                        format!("Loris::{key}"),
                        Location::new("a00100.html", fragment),
                    ));
                }
            }
        }
        entries
    }

    #[tokio::test]
    async fn awkward_keys_survive_build_and_load() {
        let entries = awkward_entries();

        for prefix_len in 0..=4 {
            let built = build_with(
                entries.clone(),
                BuildOptions {
                    prefix_len,
                    max_rejection_rate: 1.0,
                },
            );
            let report = &built.report;
            assert!(report
                .rejected
                .iter()
                .any(|rejected| rejected.reason == RejectReason::UnnormalizableKey));
            assert!(report.rejected.iter().all(|rejected| matches!(
                rejected.reason,
                RejectReason::UnnormalizableKey | RejectReason::EmptyKey
            )));

            let corpus = Corpus::from_store(built.store.clone());
            let loader = ShardLoader::for_corpus(&corpus);
            let mut records = Vec::new();
            for bucket in corpus.bucket_ids() {
                let shard = loader.load(bucket).await.expect("load");
                records.extend(shard.records().iter().cloned());
            }
            records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            assert_eq!(records, built.records, "prefix_len {prefix_len}");

            let locations: usize = records.iter().map(|record| record.locations.len()).sum();
            assert_eq!(locations, report.accepted_entries, "prefix_len {prefix_len}");
            for (index, entry) in entries.iter().enumerate() {
                if report.rejected.iter().any(|rejected| rejected.index == index) {
                    continue;
                }
                let key = normalize_key(&entry.key).expect("accepted key");
                assert!(is_normalized_key(&key));
                assert!(
                    records.iter().any(|record| record.key == key),
                    "{:?} lost at prefix_len {prefix_len}",
                    entry.key
                );
            }
        }
    }

    #[tokio::test]
    async fn every_bucket_round_trips_the_built_records() {
        let mut entries = sample_entries();
        entries.push(RawEntry::new(
            "distill",
            "Loris::Distiller::distill",
            Location::new("a00011.html", "a6b2").with_disambiguator("(PartialList &partials)"),
        ));

        for prefix_len in 0..=3 {
            let built = build_with(
                entries.clone(),
                BuildOptions {
                    prefix_len,
                    ..BuildOptions::default()
                },
            );
            let corpus = Corpus::from_store(built.store.clone());
            let loader = ShardLoader::for_corpus(&corpus);

            let mut records = Vec::new();
            for bucket in corpus.bucket_ids() {
                let shard = loader.load(bucket).await.expect("load");
                records.extend(shard.records().iter().cloned());
            }
            records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            assert_eq!(records, built.records, "prefix_len {prefix_len}");
        }
    }
}
