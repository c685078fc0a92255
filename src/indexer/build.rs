//! Index builder: raw entries in, bucketed shard store out.

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::time::Instant;

use fnv::FnvHashMap;
use rayon::prelude::*;

use super::store::{ManifestBucket, ShardStore, StoreManifest, STORE_FORMAT_VERSION};
use crate::bucket::{BucketId, BucketTable};
use crate::corpus::CorpusId;
use crate::error::{BuildError, RejectReason};
use crate::normalize::{clean_display, normalize_key};
use crate::options::BuildOptions;
use crate::shard::{encode_shard, Shard};
use crate::types::{Location, RawEntry, SymbolRecord};

/// A raw entry that did not make it into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Position of the entry in the input stream.
    pub index: usize,
    pub key: String,
    pub display_name: String,
    pub reason: RejectReason,
}

/// Summary of one build, for the build operator.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub corpus_id: CorpusId,
    pub total_entries: usize,
    pub accepted_entries: usize,
    pub rejected: Vec<RejectedEntry>,
    /// Deduplicated records after overload collapsing.
    pub records: usize,
    pub shards: usize,
}

impl BuildReport {
    pub fn rejection_rate(&self) -> f64 {
        rejection_rate(self.rejected.len(), self.total_entries)
    }
}

/// Everything a build produces.
#[derive(Debug, Clone)]
pub struct BuiltCorpus {
    pub store: ShardStore,
    /// The deduplicated record set, ordered by `(key, display_name)`.
    pub records: Vec<SymbolRecord>,
    pub report: BuildReport,
}

/// Builds one corpus' shard store.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    corpus_id: CorpusId,
    table: BucketTable,
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(corpus_id: &str, options: BuildOptions) -> Result<Self, BuildError> {
        let corpus_id = CorpusId::parse(corpus_id)?;
        let rate = options.max_rejection_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(BuildError::InvalidOptions(format!(
                "max_rejection_rate {rate} is outside 0.0..=1.0"
            )));
        }
        let table = BucketTable::new(options.prefix_len)?;
        Ok(Self {
            corpus_id,
            table,
            options,
        })
    }

    pub fn table(&self) -> &BucketTable {
        &self.table
    }

    /// Collapses, buckets, sorts and serializes `entries`.
    ///
    /// Entries with unusable keys are rejected and reported; the build fails
    /// only when the rejection rate exceeds `max_rejection_rate`.
    pub fn build<I>(&self, entries: I) -> Result<BuiltCorpus, BuildError>
    where
        I: IntoIterator<Item = RawEntry>,
    {
        let started = Instant::now();
        let mut groups: FnvHashMap<(String, String), usize> = FnvHashMap::default();
        let mut records: Vec<SymbolRecord> = Vec::new();
        let mut rejected = Vec::new();
        let mut total_entries = 0usize;

        for (index, entry) in entries.into_iter().enumerate() {
            total_entries += 1;
            let (key, display_name, location) = match prepare_entry(&entry) {
                Ok(prepared) => prepared,
                Err(reason) => {
                    log::warn!(
                        "symbol index rejected entry corpus={} index={} key={:?} display_name={:?} reason={}",
                        self.corpus_id,
                        index,
                        entry.key,
                        entry.display_name,
                        reason
                    );
                    rejected.push(RejectedEntry {
                        index,
                        key: entry.key,
                        display_name: entry.display_name,
                        reason,
                    });
                    continue;
                }
            };

            match groups.entry((key, display_name)) {
                Entry::Occupied(slot) => records[*slot.get()].locations.push(location),
                Entry::Vacant(slot) => {
                    let (key, display_name) = slot.key().clone();
                    slot.insert(records.len());
                    records.push(SymbolRecord {
                        key,
                        display_name,
                        locations: vec![location],
                    });
                }
            }
        }

        let rate = rejection_rate(rejected.len(), total_entries);
        if rate > self.options.max_rejection_rate {
            log::warn!(
                "symbol index build aborted corpus={} rejected={} total={} threshold={}",
                self.corpus_id,
                rejected.len(),
                total_entries,
                self.options.max_rejection_rate
            );
            return Err(BuildError::RejectionThresholdExceeded {
                rejected: rejected.len(),
                total: total_entries,
                threshold: self.options.max_rejection_rate,
            });
        }

        for record in &mut records {
            if let [only] = record.locations.as_mut_slice() {
                only.disambiguator = None;
            }
        }

        let mut partitions: BTreeMap<BucketId, Vec<SymbolRecord>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(self.table.bucket(&record.key))
                .or_default()
                .push(record);
        }

        let encoded = partitions
            .into_par_iter()
            .map(|(bucket, records)| {
                let shard = Shard::new(bucket, records);
                let payload = encode_shard(&shard)?;
                Ok((shard, payload))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let mut buckets = Vec::with_capacity(encoded.len());
        let mut payloads = BTreeMap::new();
        let mut all_records = Vec::new();
        for (shard, payload) in encoded {
            buckets.push(ManifestBucket {
                id: shard.bucket().clone(),
                file: shard.bucket().file_name(),
                records: shard.len(),
            });
            payloads.insert(shard.bucket().clone(), payload);
            all_records.extend(shard.into_records());
        }
        all_records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let report = BuildReport {
            corpus_id: self.corpus_id.clone(),
            total_entries,
            accepted_entries: total_entries - rejected.len(),
            rejected,
            records: all_records.len(),
            shards: buckets.len(),
        };

        log::info!(
            "symbol index built corpus={} entries={} records={} shards={} rejected={} elapsed_ms={}",
            report.corpus_id,
            report.total_entries,
            report.records,
            report.shards,
            report.rejected.len(),
            started.elapsed().as_millis()
        );

        let manifest = StoreManifest {
            version: STORE_FORMAT_VERSION,
            corpus_id: self.corpus_id.clone(),
            table: self.table,
            buckets,
        };

        Ok(BuiltCorpus {
            store: ShardStore::new(manifest, payloads),
            records: all_records,
            report,
        })
    }
}

fn prepare_entry(entry: &RawEntry) -> Result<(String, String, Location), RejectReason> {
    let key = normalize_key(&entry.key)?;
    let display_name = clean_display(&entry.display_name);
    if display_name.is_empty() {
        return Err(RejectReason::MissingDisplayName);
    }
    let page_ref = entry.location.page_ref.trim();
    if page_ref.is_empty() {
        return Err(RejectReason::MissingPageRef);
    }
    let disambiguator = entry
        .location
        .disambiguator
        .as_deref()
        .map(clean_display)
        .filter(|value| !value.is_empty());

    Ok((
        key,
        display_name,
        Location {
            page_ref: page_ref.to_string(),
            fragment: entry.location.fragment.trim().to_string(),
            disambiguator,
        },
    ))
}

fn rejection_rate(rejected: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        rejected as f64 / total as f64
    }
}
