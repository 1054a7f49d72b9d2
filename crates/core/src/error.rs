use depot_files::FilesError;
use depot_kv::KvError;
use depot_types::{PathError, RelativePath};
use depot_uuid::FileId;
use std::fmt;

/// The index an [`IndexError`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Identity,
    Checksum,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Identity => f.write_str("identity"),
            IndexKind::Checksum => f.write_str("checksum"),
        }
    }
}

/// The store operation an [`IndexError`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Put,
    Get,
    Delete,
    Fold,
}

impl fmt::Display for IndexOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexOp::Put => f.write_str("put"),
            IndexOp::Get => f.write_str("get"),
            IndexOp::Delete => f.write_str("delete"),
            IndexOp::Fold => f.write_str("scan"),
        }
    }
}

/// A single failed index operation.
#[derive(Debug, thiserror::Error)]
#[error("{index} index {op} failed for '{key}': {source}")]
pub struct IndexError {
    pub index: IndexKind,
    pub op: IndexOp,
    pub key: String,
    #[source]
    pub source: KvError,
}

impl IndexError {
    pub fn new(index: IndexKind, op: IndexOp, key: impl Into<String>, source: KvError) -> Self {
        Self {
            index,
            op,
            key: key.into(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("file operation failed: {0}")]
    Files(#[from] FilesError),
    #[error("failed to open index: {0}")]
    Kv(#[from] KvError),
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("'{path}' exists on disk but has no identifier")]
    MissingIdentity { path: RelativePath },
    #[error("no checksum stored for '{path}'")]
    ChecksumNotFound { path: RelativePath },
    #[error("no checksum stored for '{path}' (identifier {identifier})")]
    MissingChecksum { identifier: FileId, path: RelativePath },
    #[error(
        "'{path}' was written but {count} index update(s) failed: {first}",
        count = failures.len(),
        first = failures.first().map(ToString::to_string).unwrap_or_default()
    )]
    PartialIndexUpdate {
        path: RelativePath,
        failures: Vec<IndexError>,
    },
    #[error("corrupt {index} index entry '{key}': {reason}")]
    CorruptEntry {
        index: IndexKind,
        key: String,
        reason: String,
    },

    #[error("failed to read snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    SnapshotParse(serde_json::Error),
    #[error("failed to serialize snapshot: {0}")]
    SnapshotSerialize(serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    ConfigParse(toml::de::Error),
}

pub type DepotResult<T> = std::result::Result<T, DepotError>;
