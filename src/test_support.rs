//! Shared fixtures for the crate's tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::bucket::BucketId;
use crate::corpus::Corpus;
use crate::error::LoadError;
use crate::indexer::{BuiltCorpus, IndexBuilder, ShardStore};
use crate::loader::ShardSource;
use crate::options::BuildOptions;
use crate::types::{Location, RawEntry};

pub(crate) fn entry(key: &str, display: &str, page: &str, fragment: &str) -> RawEntry {
    RawEntry::new(key, display, Location::new(page, fragment))
}

/// A small Loris-like corpus spread over several first-letter buckets.
pub(crate) fn sample_entries() -> Vec<RawEntry> {
    vec![
        entry("channelize", "Loris::Channelizer::channelize", "a00008.html", "ac5e"),
        entry("channelizer", "Loris::Channelizer", "a00008.html", ""),
        entry("channels", "Loris::Channelizer::channels", "a00008.html", "a7d2"),
        entry("configure", "Loris::Analyzer::configure", "a00001.html", "a1f0"),
        entry("configure", "Loris::Analyzer::configure", "a00001.html", "a1f1"),
        entry("cropping", "Loris::Analyzer::cropping", "a00001.html", "a3c4"),
        entry("distill", "Loris::Distiller::distill", "a00011.html", "a6b1"),
        entry("frequency", "Loris::Breakpoint::frequency", "a00007.html", "a0d2"),
        entry("frequency", "Loris::Partial::frequency", "a00019.html", "a9e3"),
        entry("freqdrift", "Loris::Analyzer::freqDrift", "a00001.html", "a4a8"),
        entry("phase", "Loris::Breakpoint::phase", "a00007.html", "ae1b"),
        entry("phaseat", "Loris::Partial::phaseAt", "a00019.html", "a2c7"),
        entry("rephase", "Loris::PartialUtils::rephase", "a00060.html", "a88f"),
        entry("sift", "Loris::Sieve::sift", "a00031.html", "a5d9"),
        entry("~analyzer", "Loris::Analyzer::~Analyzer", "a00001.html", "a0aa"),
    ]
}

pub(crate) fn build_with(entries: Vec<RawEntry>, options: BuildOptions) -> BuiltCorpus {
    IndexBuilder::new("loris", options)
        .expect("builder")
        .build(entries)
        .expect("build")
}

pub(crate) fn sample_built() -> BuiltCorpus {
    build_with(sample_entries(), BuildOptions::default())
}

pub(crate) fn sample_store() -> ShardStore {
    sample_built().store
}

/// Builds a corpus whose shards are served by a `GatedSource`.
pub(crate) fn gated_corpus(store: &ShardStore) -> (Corpus, Arc<GatedSource>) {
    let source = Arc::new(GatedSource::from_store(store));
    let corpus = Corpus::new(store.manifest().clone(), source.clone());
    (corpus, source)
}

/// In-memory shard source whose fetches can be held, failed, and counted.
#[derive(Default)]
pub(crate) struct GatedSource {
    payloads: Mutex<BTreeMap<BucketId, String>>,
    gates: Mutex<FnvHashMap<BucketId, Arc<Notify>>>,
    pending_failures: Mutex<FnvHashMap<BucketId, usize>>,
    fetches: Mutex<FnvHashMap<BucketId, usize>>,
    fetch_started: Notify,
}

impl GatedSource {
    pub(crate) fn from_store(store: &ShardStore) -> Self {
        let payloads = store
            .payloads()
            .map(|(bucket, payload)| (bucket.clone(), payload.to_string()))
            .collect();
        Self {
            payloads: Mutex::new(payloads),
            ..Self::default()
        }
    }

    pub(crate) fn set_payload(&self, bucket: &BucketId, payload: &str) {
        self.payloads
            .lock()
            .insert(bucket.clone(), payload.to_string());
    }

    /// Blocks fetches of `bucket` until `release` is called.
    pub(crate) fn hold(&self, bucket: &BucketId) {
        self.gates
            .lock()
            .insert(bucket.clone(), Arc::new(Notify::new()));
    }

    pub(crate) fn release(&self, bucket: &BucketId) {
        let mut gates = self.gates.lock();
        if let Some(gate) = gates.remove(bucket) {
            gate.notify_waiters();
        }
    }

    /// Makes the next fetch of `bucket` fail with an I/O error.
    pub(crate) fn fail_next(&self, bucket: &BucketId) {
        *self
            .pending_failures
            .lock()
            .entry(bucket.clone())
            .or_default() += 1;
    }

    pub(crate) fn fetch_count(&self, bucket: &BucketId) -> usize {
        self.fetches.lock().get(bucket).copied().unwrap_or(0)
    }

    pub(crate) fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    /// Waits until `bucket` has been fetched at least `count` times.
    pub(crate) async fn wait_for_fetch(&self, bucket: &BucketId, count: usize) {
        loop {
            let started = self.fetch_started.notified();
            tokio::pin!(started);
            started.as_mut().enable();
            if self.fetch_count(bucket) >= count {
                return;
            }
            started.await;
        }
    }
}

#[async_trait]
impl ShardSource for GatedSource {
    async fn fetch(&self, bucket: &BucketId) -> Result<String, LoadError> {
        *self.fetches.lock().entry(bucket.clone()).or_default() += 1;
        self.fetch_started.notify_waiters();

        let gate = self.gates.lock().get(bucket).cloned();
        if let Some(gate) = gate {
            let released = gate.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if self.gates.lock().contains_key(bucket) {
                released.await;
            }
        }

        let fail = {
            let mut failures = self.pending_failures.lock();
            match failures.get_mut(bucket) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(LoadError::Io {
                target: bucket.file_name(),
                message: "injected failure".to_string(),
            });
        }

        self.payloads
            .lock()
            .get(bucket)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                target: bucket.file_name(),
            })
    }
}
