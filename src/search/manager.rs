//! SymbolSearchManager - main API for querying registered corpora.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};

use super::engine::{narrow_matches, rank_shards, RankedMatches};
use crate::bucket::BucketId;
use crate::cancel::{CancellationToken, GenerationTracker};
use crate::corpus::{Corpus, CorpusId};
use crate::error::{LoadError, SearchError};
use crate::loader::{LoaderStats, ShardLoader};
use crate::normalize::normalize_query;
use crate::options::{SearchOptions, SubstringScope};
use crate::shard::Shard;
use crate::types::{GroupedResult, SearchResult};

/// Complete match set of the last live search, kept for narrowing.
struct NarrowingBase {
    query: String,
    matches: Arc<Vec<GroupedResult>>,
}

/// A corpus with its own cache and generation counter.
struct RegisteredCorpus {
    corpus: Corpus,
    loader: ShardLoader,
    tracker: GenerationTracker,
    narrowing: Mutex<Option<NarrowingBase>>,
}

impl std::fmt::Debug for RegisteredCorpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCorpus")
            .field("corpus", self.corpus.id())
            .field("generation", &self.tracker.current())
            .field("loader", &self.loader)
            .finish()
    }
}

/// Manages registered corpora and runs searches against them.
#[derive(Debug, Default)]
pub struct SymbolSearchManager {
    corpora: RwLock<HashMap<CorpusId, Arc<RegisteredCorpus>>>,
    options: SearchOptions,
}

impl SymbolSearchManager {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Registers a corpus. Each corpus gets its own loader, cache and
    /// generation tracker; ids must be unique.
    pub fn register(&self, corpus: Corpus) -> Result<CorpusId, SearchError> {
        let id = corpus.id().clone();
        let mut corpora = self.corpora.write();
        if corpora.contains_key(&id) {
            return Err(SearchError::DuplicateCorpus(id));
        }

        log::info!(
            "registered symbol corpus corpus={} buckets={} records={}",
            id,
            corpus.manifest().buckets.len(),
            corpus.manifest().total_records()
        );
        let loader = ShardLoader::for_corpus(&corpus);
        corpora.insert(
            id.clone(),
            Arc::new(RegisteredCorpus {
                corpus,
                loader,
                tracker: GenerationTracker::new(),
                narrowing: Mutex::new(None),
            }),
        );
        Ok(id)
    }

    /// Removes a corpus. In-flight searches against it are superseded and
    /// resolve to `None`.
    pub fn unregister(&self, corpus: &CorpusId) -> Result<(), SearchError> {
        let removed = self.corpora.write().remove(corpus);
        match removed {
            Some(entry) => {
                entry.tracker.cancel();
                log::info!("unregistered symbol corpus corpus={corpus}");
                Ok(())
            }
            None => Err(SearchError::UnknownCorpus(corpus.clone())),
        }
    }

    /// Registered corpus ids, sorted.
    pub fn corpora(&self) -> Vec<CorpusId> {
        let mut ids: Vec<_> = self.corpora.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Starts a new generation for `corpus` and returns the search to run.
    ///
    /// Every older search on the corpus becomes stale as soon as this returns.
    pub fn begin_search(
        &self,
        corpus: &CorpusId,
        raw_query: &str,
    ) -> Result<PendingSearch, SearchError> {
        let entry = self.entry(corpus)?;
        let token = entry.tracker.next_token();
        Ok(PendingSearch {
            entry,
            options: self.options,
            token,
            raw_query: raw_query.to_string(),
            normalized: normalize_query(raw_query),
        })
    }

    /// Searches `corpus` for `raw_query`.
    ///
    /// Returns `Ok(None)` when a newer search (or `cancel`) superseded this
    /// one before it finished. Shard load failures never fail the search;
    /// they are reported in `SearchResult::unavailable_buckets`.
    pub async fn search(
        &self,
        corpus: &CorpusId,
        raw_query: &str,
    ) -> Result<Option<SearchResult>, SearchError> {
        Ok(self.begin_search(corpus, raw_query)?.run().await)
    }

    /// Marks the current generation of `corpus` stale. Safe to call with no
    /// search outstanding.
    pub fn cancel(&self, corpus: &CorpusId) -> Result<u64, SearchError> {
        let entry = self.entry(corpus)?;
        let generation = entry.tracker.cancel();
        log::debug!("search cancelled corpus={corpus} generation={generation}");
        Ok(generation)
    }

    /// The live generation of `corpus`.
    pub fn current_generation(&self, corpus: &CorpusId) -> Result<u64, SearchError> {
        Ok(self.entry(corpus)?.tracker.current())
    }

    pub fn loader(&self, corpus: &CorpusId) -> Result<ShardLoader, SearchError> {
        Ok(self.entry(corpus)?.loader.clone())
    }

    pub fn loader_stats(&self, corpus: &CorpusId) -> Result<LoaderStats, SearchError> {
        Ok(self.entry(corpus)?.loader.stats())
    }

    fn entry(&self, corpus: &CorpusId) -> Result<Arc<RegisteredCorpus>, SearchError> {
        self.corpora
            .read()
            .get(corpus)
            .cloned()
            .ok_or_else(|| SearchError::UnknownCorpus(corpus.clone()))
    }
}

/// One search generation, ready to run.
#[derive(Debug)]
pub struct PendingSearch {
    entry: Arc<RegisteredCorpus>,
    options: SearchOptions,
    token: CancellationToken,
    raw_query: String,
    normalized: String,
}

impl PendingSearch {
    pub fn corpus(&self) -> &CorpusId {
        self.entry.corpus.id()
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    /// Runs the search; `None` means it was superseded.
    pub async fn run(self) -> Option<SearchResult> {
        let result = self.execute().await;
        if result.is_none() {
            log::debug!(
                "search superseded corpus={} generation={} query={:?}",
                self.corpus(),
                self.generation(),
                self.raw_query
            );
        }
        result
    }

    async fn execute(&self) -> Option<SearchResult> {
        let started = Instant::now();
        if self.normalized.is_empty() {
            self.token.ensure_live()?;
            return Some(self.finish(RankedMatches::default(), Vec::new(), false));
        }

        let buckets = self.candidate_buckets();
        let (ranked, unavailable, narrowed) = match self.narrowing_base() {
            Some(previous) => {
                let scope = match self.options.substring_scope {
                    SubstringScope::PrefixBuckets => Some(buckets.as_slice()),
                    SubstringScope::Corpus => None,
                };
                let ranked = narrow_matches(
                    &previous,
                    &self.normalized,
                    self.entry.corpus.table(),
                    scope,
                    &self.token,
                )?;
                (ranked, Vec::new(), true)
            }
            None => {
                let (shards, unavailable) = self.load_buckets(&buckets).await;
                self.token.ensure_live()?;
                let ranked = rank_shards(&shards, &self.normalized, &self.token)?;
                (ranked, unavailable, false)
            }
        };

        self.token.ensure_live()?;
        if self.options.narrowing && unavailable.is_empty() {
            *self.entry.narrowing.lock() = Some(NarrowingBase {
                query: self.normalized.clone(),
                matches: Arc::new(ranked.hits.clone()),
            });
        }

        let result = self.finish(ranked, unavailable, narrowed);
        log::debug!(
            "search completed corpus={} generation={} query={:?} hits={} scanned={} unavailable={} narrowed={} elapsed_ms={}",
            result.corpus,
            result.generation,
            result.normalized_query,
            result.count,
            result.scanned,
            result.unavailable_buckets.len(),
            result.narrowed,
            started.elapsed().as_millis()
        );
        Some(result)
    }

    fn candidate_buckets(&self) -> Vec<BucketId> {
        let corpus = &self.entry.corpus;
        match self.options.substring_scope {
            SubstringScope::PrefixBuckets => corpus
                .table()
                .prefix_candidates(&self.normalized, corpus.bucket_ids()),
            SubstringScope::Corpus => corpus.bucket_ids().cloned().collect(),
        }
    }

    /// Matches of the last complete search when this query extends it.
    fn narrowing_base(&self) -> Option<Arc<Vec<GroupedResult>>> {
        if !self.options.narrowing {
            return None;
        }
        self.entry
            .narrowing
            .lock()
            .as_ref()
            .filter(|base| self.normalized.starts_with(base.query.as_str()))
            .map(|base| base.matches.clone())
    }

    /// Loads `buckets` concurrently. Failed or timed-out buckets are returned
    /// as unavailable; their fetches keep running and may still fill the cache.
    async fn load_buckets(&self, buckets: &[BucketId]) -> (Vec<Arc<Shard>>, Vec<BucketId>) {
        let loader = &self.entry.loader;
        let timeout = self.options.load_timeout();
        let loads = buckets.iter().map(|bucket| async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, loader.load(bucket))
                    .await
                    .unwrap_or_else(|_| {
                        Err(LoadError::TimedOut {
                            target: bucket.file_name(),
                        })
                    }),
                None => loader.load(bucket).await,
            };
            (bucket, result)
        });

        let mut shards = Vec::with_capacity(buckets.len());
        let mut unavailable = Vec::new();
        for (bucket, result) in join_all(loads).await {
            match result {
                Ok(shard) => shards.push(shard),
                Err(error) => {
                    log::warn!(
                        "bucket unavailable corpus={} generation={} bucket={} error={}",
                        self.corpus(),
                        self.generation(),
                        bucket,
                        error
                    );
                    unavailable.push(bucket.clone());
                }
            }
        }
        (shards, unavailable)
    }

    fn finish(
        &self,
        ranked: RankedMatches,
        unavailable_buckets: Vec<BucketId>,
        narrowed: bool,
    ) -> SearchResult {
        let count = ranked.hits.len();
        let mut hits = ranked.hits;
        let truncated = match self.options.max_results {
            Some(max) if count > max => {
                hits.truncate(max);
                true
            }
            _ => false,
        };

        SearchResult {
            corpus: self.corpus().clone(),
            query: self.raw_query.clone(),
            normalized_query: self.normalized.clone(),
            generation: self.generation(),
            hits,
            count,
            truncated,
            scanned: ranked.scanned,
            unavailable_buckets,
            narrowed,
        }
    }
}
