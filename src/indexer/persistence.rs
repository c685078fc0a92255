//! Shard store persistence.
//!
//! Two layouts are supported:
//! - Directory: `manifest.json` plus one `<bucket>.js` payload per shard, so
//!   shards can be fetched one at a time.
//! - Packed: the whole store in a single postcard-encoded, zstd-compressed
//!   file for offline distribution.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::thread::available_parallelism;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::store::{ShardStore, StoreManifest};
use crate::error::{BuildError, LoadError};

/// File name of the manifest inside a store directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Packed format version - increment when changing the packed layout.
pub const PACKED_STORE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PackedStore {
    version: u32,
    /// Unix timestamp when the pack was written.
    saved_at: u64,
    store: ShardStore,
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

impl ShardStore {
    /// Writes the directory layout.
    ///
    /// Every file is written to a temporary sibling and renamed into place.
    /// The manifest goes last so readers never see buckets without payloads.
    pub fn write_dir(&self, dir: &Path) -> Result<(), BuildError> {
        fs::create_dir_all(dir)?;

        for (bucket, payload) in self.payloads() {
            let file = match self.manifest().bucket(bucket) {
                Some(listed) => listed.file.clone(),
                None => bucket.file_name(),
            };
            write_atomic(dir, &file, payload.as_bytes())?;
        }

        let manifest = serde_json::to_vec_pretty(self.manifest()).map_err(|error| {
            BuildError::Serialization(format!("failed to encode manifest: {error}"))
        })?;
        write_atomic(dir, MANIFEST_FILE, &manifest)?;

        log::debug!(
            "wrote shard store corpus={} dir={} shards={}",
            self.manifest().corpus_id,
            dir.display(),
            self.manifest().buckets.len()
        );
        Ok(())
    }

    /// Writes the packed layout.
    ///
    /// - Postcard encoding (compact binary format)
    /// - Zstd compression (level 6, multi-threaded)
    /// - Atomic write (temp file + rename)
    pub fn write_packed(&self, path: &Path) -> Result<(), BuildError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let packed = PackedStore {
            version: PACKED_STORE_VERSION,
            saved_at: unix_now_secs(),
            store: self.clone(),
        };

        let tmp = NamedTempFile::new_in(parent)?;
        {
            let mut encoder = zstd::Encoder::new(tmp.as_file(), 6).map_err(|error| {
                BuildError::Serialization(format!("failed to create zstd encoder: {error}"))
            })?;
            let threads = available_parallelism()
                .map(|count| count.get() as u32)
                .unwrap_or(4);
            encoder.multithread(threads).map_err(|error| {
                BuildError::Serialization(format!("failed to enable multi-threaded zstd: {error}"))
            })?;

            let mut output = BufWriter::new(encoder.auto_finish());
            postcard::to_io(&packed, &mut output).map_err(|error| {
                BuildError::Serialization(format!("failed to encode packed store: {error}"))
            })?;
            output.flush()?;
        }
        tmp.persist(path).map_err(|error| BuildError::Io(error.error))?;

        log::debug!(
            "wrote packed shard store corpus={} path={} shards={}",
            self.manifest().corpus_id,
            path.display(),
            self.manifest().buckets.len()
        );
        Ok(())
    }
}

fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> Result<(), BuildError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(dir.join(file_name))
        .map_err(|error| BuildError::Io(error.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Reads and validates the manifest of a store directory.
pub async fn read_manifest(dir: &Path) -> Result<StoreManifest, LoadError> {
    let path = dir.join(MANIFEST_FILE);
    let target = path.display().to_string();
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|error| LoadError::io(&target, &error))?;
    let manifest: StoreManifest = serde_json::from_slice(&bytes)
        .map_err(|error| LoadError::malformed(&target, error.to_string()))?;
    manifest.validate(&target)?;
    Ok(manifest)
}

/// Reads a packed store.
pub fn read_packed(path: &Path) -> Result<ShardStore, LoadError> {
    let target = path.display().to_string();
    let input = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(LoadError::NotFound { target })
        }
        Err(error) => return Err(LoadError::io(&target, &error)),
    };

    let bytes = zstd::decode_all(BufReader::new(input)).map_err(|error| {
        LoadError::malformed(&target, format!("decompress failed: {error}"))
    })?;
    let packed: PackedStore = postcard::from_bytes(&bytes)
        .map_err(|error| LoadError::malformed(&target, format!("decode failed: {error}")))?;

    if packed.version != PACKED_STORE_VERSION {
        return Err(LoadError::VersionMismatch {
            target,
            found: packed.version,
            expected: PACKED_STORE_VERSION,
        });
    }
    packed.store.manifest().validate(&target)?;

    log::debug!(
        "loaded packed shard store corpus={} path={} shards={} saved_at={}",
        packed.store.manifest().corpus_id,
        target,
        packed.store.manifest().buckets.len(),
        packed.saved_at
    );
    Ok(packed.store)
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
