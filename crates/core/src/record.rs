//! Records exchanged with callers: stored files, snapshots and operation reports.

use crate::error::{DepotError, IndexError};
use depot_types::{RelativePath, Sha256Hash};
use depot_uuid::FileId;

/// One stored file as seen by the indices.
///
/// This is also the element type of a snapshot file, so field names are part of the backup
/// format. `checksum` may be absent on input; older snapshots spell the fields `id` and
/// `sha256sum`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub path: RelativePath,
    #[serde(alias = "id")]
    pub identifier: FileId,
    #[serde(default, alias = "sha256sum", skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Sha256Hash>,
}

/// Result of a full dump of the indices.
#[derive(Debug, Default)]
pub struct DumpOutcome {
    pub records: Vec<FileRecord>,
    /// Entries that could not be fully resolved; their records are still in `records`
    pub errors: Vec<DepotError>,
}

impl DumpOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of a prefix-propagating operation (`move_path`, `delete`).
///
/// The disk mutation has already happened when a report is returned; `failures` lists index
/// entries that are now stale.
#[derive(Debug, Default)]
pub struct PrefixReport {
    /// Number of identity entries whose path was under the prefix
    pub identities: usize,
    /// Number of checksum entries whose path was under the prefix
    pub checksums: usize,
    pub failures: Vec<IndexError>,
}

impl PrefixReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn merge(&mut self, other: PrefixReport) {
        self.identities += other.identities;
        self.checksums += other.checksums;
        self.failures.extend(other.failures);
    }
}

/// A file that failed inside a bulk store.
#[derive(Debug)]
pub struct BulkFailure {
    pub path: RelativePath,
    pub error: DepotError,
}

/// Result of storing many files in one request.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub files: Vec<FileRecord>,
    pub errors: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// True when every file was stored and indexed.
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}
