use std::fmt;

use crate::corpus::CorpusId;

/// Fatal build-time failures.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid corpus id: {0}")]
    InvalidCorpusId(String),

    #[error("Invalid bucket table: {0}")]
    InvalidBucketTable(String),

    #[error("Invalid build options: {0}")]
    InvalidOptions(String),

    #[error("rejected {rejected} of {total} entries, above the allowed rate {threshold}")]
    RejectionThresholdExceeded {
        rejected: usize,
        total: usize,
        threshold: f64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Import error: {0}")]
    Import(String),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Why a single raw entry was rejected. Rejections are reported, not fatal,
/// until the rejection rate crosses the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyKey,
    UnnormalizableKey,
    MissingDisplayName,
    MissingPageRef,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyKey => "empty key",
            Self::UnnormalizableKey => "unnormalizable key",
            Self::MissingDisplayName => "missing display name",
            Self::MissingPageRef => "missing page reference",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query-time failure to obtain a shard (or a store manifest).
///
/// Cloneable because a single in-flight load is awaited by every coalesced
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("{target} not found")]
    NotFound { target: String },

    #[error("IO error reading {target}: {message}")]
    Io { target: String, message: String },

    #[error("malformed payload for {target}: {message}")]
    Malformed { target: String, message: String },

    #[error("load of {target} aborted: {message}")]
    Aborted { target: String, message: String },

    #[error("load of {target} timed out")]
    TimedOut { target: String },

    #[error("{target} has format version {found}, expected {expected}")]
    VersionMismatch {
        target: String,
        found: u32,
        expected: u32,
    },
}

impl LoadError {
    pub fn io(target: impl Into<String>, error: &std::io::Error) -> Self {
        let target = target.into();
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { target }
        } else {
            Self::Io {
                target,
                message: error.to_string(),
            }
        }
    }

    pub fn malformed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            target: target.into(),
            message: message.into(),
        }
    }
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// A single record that could not be decoded. The rest of the shard stays usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record {record}: {message}")]
pub struct PartialParseError {
    pub record: usize,
    pub message: String,
}

/// Misuse of the search API. Runtime load failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("unknown corpus: {0}")]
    UnknownCorpus(CorpusId),

    #[error("corpus already registered: {0}")]
    DuplicateCorpus(CorpusId),
}
