//! # Depot Core
//!
//! Metadata-consistency engine for the Depot file store.
//!
//! Files live in a plain directory tree. Two indices are kept next to it:
//! - the identity index maps a stable [`FileId`] to the file's current path
//! - the checksum index maps a path to the SHA-256 of the file's content
//!
//! [`MetadataEngine`] performs every mutation of the tree and keeps both indices in step,
//! including prefix propagation when whole directories are moved or removed.
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest`, `cli` and
//! the `depot` binary.

pub mod collector;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod prefix;
pub mod reconcile;
pub mod record;
pub mod snapshot;

pub use collector::ResultCollector;
pub use config::{normalize_listen_addr, ConfigFile, CoreConfig, DefaultPaths};
pub use engine::MetadataEngine;
pub use error::{DepotError, DepotResult, IndexError, IndexKind, IndexOp};
pub use reconcile::ReconcileReport;
pub use record::{BulkFailure, BulkOutcome, DumpOutcome, FileRecord, PrefixReport};
pub use snapshot::{read_snapshot, write_snapshot};

pub use depot_files::{sha256_hex, FileSystem, FilesError, LocalFileSystem};
pub use depot_kv::{KeyValueStore, KvError, MemoryStore, StorageBackend};
pub use depot_types::{PathError, RelativePath, Sha256Hash};
pub use depot_uuid::FileId;
