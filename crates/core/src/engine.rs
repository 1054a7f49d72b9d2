//! Metadata-consistency engine.
//!
//! [`MetadataEngine`] keeps the identity index (identifier -> path) and the checksum index
//! (path -> SHA-256) in step with the file tree while it is mutated.
//!
//! ## Ordering
//!
//! Within one operation the disk mutation always happens first. Index writes follow and are
//! always completed before the operation returns; nothing is left running in the background.
//! There is no atomicity across the tree and the two indices: if an index write fails after the
//! disk changed, the error is reported and the disk is not rolled back.
//!
//! ## Cost
//!
//! Lookups by path (`find_identity_by_path`) and prefix propagation scan a whole index, so they
//! are linear in the number of stored files.

use crate::collector::ResultCollector;
use crate::config::CoreConfig;
use crate::error::{DepotError, DepotResult, IndexError, IndexKind, IndexOp};
use crate::prefix;
use crate::record::{BulkFailure, BulkOutcome, DumpOutcome, FileRecord, PrefixReport};
use depot_files::{sha256_hex, FileSystem, LocalFileSystem};
use depot_kv::{open_store, KeyValueStore};
use depot_types::{RelativePath, Sha256Hash};
use depot_uuid::FileId;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;

/// Orchestrates the file tree and both indices.
///
/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct MetadataEngine {
    pub(crate) files: Arc<dyn FileSystem>,
    pub(crate) identity: Arc<dyn KeyValueStore>,
    pub(crate) checksums: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for MetadataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEngine").finish_non_exhaustive()
    }
}

impl MetadataEngine {
    /// Builds an engine from explicitly constructed collaborators.
    pub fn new(
        files: Arc<dyn FileSystem>,
        identity: Arc<dyn KeyValueStore>,
        checksums: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            files,
            identity,
            checksums,
        }
    }

    /// Creates missing directories and opens the configured stores.
    pub fn open(cfg: &CoreConfig) -> DepotResult<Self> {
        std::fs::create_dir_all(cfg.base_dir()).map_err(depot_files::FilesError::Io)?;
        std::fs::create_dir_all(cfg.cache_dir()).map_err(depot_files::FilesError::Io)?;

        let files = LocalFileSystem::new(cfg.base_dir())?;
        let identity = open_store(cfg.backend(), &cfg.identity_index_dir())?;
        let checksums = open_store(cfg.backend(), &cfg.checksum_index_dir())?;

        tracing::info!(
            "opened {} indices in {} for {}",
            cfg.backend(),
            cfg.cache_dir().display(),
            files.root_directory().display()
        );

        Ok(Self::new(Arc::new(files), identity, checksums))
    }

    pub fn files(&self) -> &dyn FileSystem {
        self.files.as_ref()
    }

    /// Writes `content` at `path` and indexes it.
    ///
    /// An existing path keeps its identifier; a new path gets a fresh one. A failed disk write
    /// leaves both indices untouched. Failed index writes are returned as
    /// [`DepotError::PartialIndexUpdate`] with the file already on disk.
    pub fn store(&self, path: &RelativePath, content: &[u8]) -> DepotResult<FileRecord> {
        let identifier = if self.files.path_exists(path)? {
            self.find_identity_by_path(path)?
                .ok_or_else(|| DepotError::MissingIdentity { path: path.clone() })?
        } else {
            FileId::new()
        };

        self.files.write_file(path, content)?;

        let checksum = sha256_hex(content);
        let mut failures = Vec::new();

        if let Err(e) = self.identity.put(identifier.as_bytes(), path.as_str().as_bytes()) {
            failures.push(IndexError::new(
                IndexKind::Identity,
                IndexOp::Put,
                identifier.as_str(),
                e,
            ));
        }
        if let Err(e) = self
            .checksums
            .put(path.as_str().as_bytes(), checksum.as_str().as_bytes())
        {
            failures.push(IndexError::new(
                IndexKind::Checksum,
                IndexOp::Put,
                path.as_str(),
                e,
            ));
        }

        if !failures.is_empty() {
            tracing::warn!("store: {} index write(s) failed for {}", failures.len(), path);
            return Err(DepotError::PartialIndexUpdate {
                path: path.clone(),
                failures,
            });
        }

        tracing::debug!("stored {} as {}", path, identifier);
        Ok(FileRecord {
            path: path.clone(),
            identifier,
            checksum: Some(checksum),
        })
    }

    /// Stores many files on a bounded pool of workers and waits for all of them.
    ///
    /// Distinct paths are spread over at most [`thread::available_parallelism`] workers. Several
    /// contents for the same path are written in request order by a single worker, so they share
    /// one identifier.
    pub fn store_many(&self, files: Vec<(RelativePath, Vec<u8>)>) -> BulkOutcome {
        let mut by_path: BTreeMap<RelativePath, Vec<Vec<u8>>> = BTreeMap::new();
        for (path, content) in files {
            by_path.entry(path).or_default().push(content);
        }

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(by_path.len());
        let mut batches: Vec<Vec<(&RelativePath, &Vec<Vec<u8>>)>> = vec![Vec::new(); workers];
        for (i, entry) in by_path.iter().enumerate() {
            batches[i % workers].push(entry);
        }

        let stored = ResultCollector::new();
        let failed = ResultCollector::new();

        thread::scope(|scope| {
            for batch in &batches {
                let stored = &stored;
                let failed = &failed;
                scope.spawn(move || {
                    for &(path, contents) in batch {
                        for content in contents {
                            match self.store(path, content) {
                                Ok(record) => stored.push(record),
                                Err(error) => {
                                    tracing::warn!("store_many: {}: {}", path, error);
                                    failed.push(BulkFailure {
                                        path: path.clone(),
                                        error,
                                    });
                                }
                            }
                        }
                    }
                });
            }
        });

        BulkOutcome {
            files: stored.into_inner(),
            errors: failed.into_inner(),
        }
    }

    /// Removes the file or directory at `prefix` and every index entry under it.
    ///
    /// Index cleanup is best effort: failures end up in the report, the loop continues.
    pub fn delete(&self, prefix: &RelativePath) -> DepotResult<PrefixReport> {
        self.files.remove_recursive(prefix)?;

        let report = prefix::remove_under(self.identity.as_ref(), self.checksums.as_ref(), prefix);
        tracing::debug!(
            "deleted {} ({} identities, {} checksums, {} failures)",
            prefix,
            report.identities,
            report.checksums,
            report.failures.len()
        );
        Ok(report)
    }

    /// Renames `old` to `new` on disk and propagates the rename through both indices.
    ///
    /// The two index rewrites run in parallel and are both joined before returning. A file the
    /// rename replaces at `new` loses its identifier, so every path keeps a single identity.
    pub fn move_path(&self, old: &RelativePath, new: &RelativePath) -> DepotResult<PrefixReport> {
        if old == new {
            return Ok(PrefixReport::default());
        }
        if prefix::is_under(new.as_str(), old.as_str()) {
            return Err(DepotError::InvalidInput(format!(
                "cannot move {} into itself ({})",
                old, new
            )));
        }

        if let Some(parent) = new.parent() {
            if !self.files.path_exists(&parent)? {
                self.files.create_directories(&parent)?;
            }
        }

        let displaced = prefix::displaced_identities(self.identity.as_ref(), old, new)?;

        self.files.rename_path(old, new)?;

        let report = thread::scope(|scope| {
            let checksums =
                scope.spawn(|| prefix::move_checksums(self.checksums.as_ref(), old, new));
            let mut report = prefix::drop_identities(self.identity.as_ref(), &displaced);
            report.merge(prefix::move_identities(self.identity.as_ref(), old, new));
            match checksums.join() {
                Ok(other) => report.merge(other),
                Err(panic) => std::panic::resume_unwind(panic),
            }
            report
        });

        tracing::debug!(
            "moved {} to {} ({} identities, {} checksums, {} failures)",
            old,
            new,
            report.identities,
            report.checksums,
            report.failures.len()
        );
        Ok(report)
    }

    /// Relocates exactly one checksum entry.
    pub fn move_checksum(&self, src: &RelativePath, dst: &RelativePath) -> DepotResult<()> {
        let hash = self
            .checksums
            .get(src.as_str().as_bytes())
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Get, src.as_str(), e))?
            .ok_or_else(|| DepotError::ChecksumNotFound { path: src.clone() })?;

        self.checksums
            .delete(src.as_str().as_bytes())
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Delete, src.as_str(), e))?;
        self.checksums
            .put(dst.as_str().as_bytes(), &hash)
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Put, dst.as_str(), e))?;
        Ok(())
    }

    /// Finds the identifier whose stored path is exactly `path`.
    pub fn find_identity_by_path(&self, path: &RelativePath) -> DepotResult<Option<FileId>> {
        let wanted = path.as_str().as_bytes();
        let mut found = None;

        self.identity
            .fold(&mut |key, value| {
                if value == wanted {
                    found = Some(key.to_vec());
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Fold, path.as_str(), e))?;

        found
            .map(|key| decode_id(&key))
            .transpose()
    }

    /// Returns the current path of `id`.
    pub fn path_of(&self, id: &FileId) -> DepotResult<Option<RelativePath>> {
        let value = self
            .identity
            .get(id.as_bytes())
            .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Get, id.as_str(), e))?;
        value
            .map(|bytes| decode_path(IndexKind::Identity, id.as_str(), &bytes))
            .transpose()
    }

    /// Returns the stored checksum of `path`.
    pub fn checksum_of(&self, path: &RelativePath) -> DepotResult<Option<Sha256Hash>> {
        let value = self
            .checksums
            .get(path.as_str().as_bytes())
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Get, path.as_str(), e))?;
        value
            .map(|bytes| decode_hash(path.as_str(), &bytes))
            .transpose()
    }

    /// Reads the file addressed by `id`.
    pub fn read(&self, id: &FileId) -> DepotResult<Option<(RelativePath, Vec<u8>)>> {
        let Some(path) = self.path_of(id)? else {
            return Ok(None);
        };
        let content = self.files.read_file(&path)?;
        Ok(Some((path, content)))
    }

    /// Loads records straight into the indices.
    ///
    /// Every record overwrites whatever was stored for its identifier and path. The disk is not
    /// consulted. Records without a checksum only populate the identity index.
    pub fn restore(&self, records: &[FileRecord]) -> Vec<IndexError> {
        let mut errors = Vec::new();

        for record in records {
            let path = record.path.as_str().as_bytes();
            if let Err(e) = self.identity.put(record.identifier.as_bytes(), path) {
                errors.push(IndexError::new(
                    IndexKind::Identity,
                    IndexOp::Put,
                    record.path.as_str(),
                    e,
                ));
            }
            if let Some(checksum) = &record.checksum {
                if let Err(e) = self.checksums.put(path, checksum.as_str().as_bytes()) {
                    errors.push(IndexError::new(
                        IndexKind::Checksum,
                        IndexOp::Put,
                        record.path.as_str(),
                        e,
                    ));
                }
            }
        }

        tracing::info!(
            "restored {} record(s), {} error(s)",
            records.len(),
            errors.len()
        );
        errors
    }

    /// Exports every indexed file.
    ///
    /// A missing or unreadable checksum does not drop the record; it is emitted without a
    /// checksum and the problem is listed in `errors`.
    pub fn dump(&self) -> DepotResult<DumpOutcome> {
        let mut pairs = Vec::new();
        self.identity
            .fold(&mut |key, value| {
                pairs.push((key.to_vec(), value.to_vec()));
                ControlFlow::Continue(())
            })
            .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Fold, "*", e))?;

        let mut outcome = DumpOutcome::default();
        for (key, value) in pairs {
            let identifier = match decode_id(&key) {
                Ok(id) => id,
                Err(e) => {
                    outcome.errors.push(e);
                    continue;
                }
            };
            let path = match decode_path(IndexKind::Identity, identifier.as_str(), &value) {
                Ok(path) => path,
                Err(e) => {
                    outcome.errors.push(e);
                    continue;
                }
            };

            let checksum = match self.checksum_of(&path) {
                Ok(Some(checksum)) => Some(checksum),
                Ok(None) => {
                    outcome.errors.push(DepotError::MissingChecksum {
                        identifier: identifier.clone(),
                        path: path.clone(),
                    });
                    None
                }
                Err(e) => {
                    outcome.errors.push(e);
                    None
                }
            };

            outcome.records.push(FileRecord {
                path,
                identifier,
                checksum,
            });
        }

        Ok(outcome)
    }

    /// Flushes both indices to durable storage.
    pub fn flush(&self) -> DepotResult<()> {
        self.identity
            .flush()
            .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Put, "flush", e))?;
        self.checksums
            .flush()
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Put, "flush", e))?;
        Ok(())
    }
}

pub(crate) fn decode_id(bytes: &[u8]) -> DepotResult<FileId> {
    FileId::from_bytes(bytes).map_err(|e| DepotError::CorruptEntry {
        index: IndexKind::Identity,
        key: String::from_utf8_lossy(bytes).into_owned(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode_path(index: IndexKind, key: &str, bytes: &[u8]) -> DepotResult<RelativePath> {
    let corrupt = |reason: String| DepotError::CorruptEntry {
        index,
        key: key.to_owned(),
        reason,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
    RelativePath::new(text).map_err(|e| corrupt(e.to_string()))
}

pub(crate) fn decode_hash(key: &str, bytes: &[u8]) -> DepotResult<Sha256Hash> {
    let corrupt = |reason: String| DepotError::CorruptEntry {
        index: IndexKind::Checksum,
        key: key.to_owned(),
        reason,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
    Sha256Hash::parse(text).map_err(|e| corrupt(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use depot_kv::{KvError, KvResult, MemoryStore, SledStore, Visitor};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn rel(path: &str) -> RelativePath {
        RelativePath::new(path).unwrap()
    }

    /// Engine over a temporary root and in-memory indices.
    pub(crate) fn create_engine() -> (TempDir, MetadataEngine, MemoryStore, MemoryStore) {
        let temp = TempDir::new().unwrap();
        let files = LocalFileSystem::new(temp.path()).unwrap();
        let identity = MemoryStore::new();
        let checksums = MemoryStore::new();
        let engine = MetadataEngine::new(
            Arc::new(files),
            Arc::new(identity.clone()),
            Arc::new(checksums.clone()),
        );
        (temp, engine, identity, checksums)
    }

    /// Store whose writes always fail.
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn put(&self, _key: &[u8], _value: &[u8]) -> KvResult<()> {
            Err(KvError::Backend("disk full".into()))
        }

        fn get(&self, _key: &[u8]) -> KvResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn delete(&self, _key: &[u8]) -> KvResult<()> {
            Err(KvError::Backend("disk full".into()))
        }

        fn fold(&self, _visitor: &mut Visitor<'_>) -> KvResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_store_round_trip_and_checksum() {
        let (temp, engine, _, _) = create_engine();

        let record = engine.store(&rel("testdir/test.txt"), b"test data").unwrap();

        assert_eq!(
            fs::read(temp.path().join("testdir/test.txt")).unwrap(),
            b"test data"
        );
        assert_eq!(
            record.checksum.unwrap().as_str(),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
        assert_eq!(record.path.as_str(), "testdir/test.txt");
        assert!(FileId::is_canonical(record.identifier.as_str()));
    }

    #[test]
    fn test_store_populates_both_indices() {
        let (_temp, engine, identity, checksums) = create_engine();

        let record = engine.store(&rel("a.txt"), b"hello").unwrap();

        assert_eq!(
            identity.get(record.identifier.as_bytes()).unwrap().unwrap(),
            b"a.txt"
        );
        assert_eq!(
            checksums.get(b"a.txt").unwrap().unwrap(),
            b"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_overwrite_keeps_identifier() {
        let (_temp, engine, identity, _) = create_engine();

        let first = engine.store(&rel("doc.txt"), b"A").unwrap();
        let second = engine.store(&rel("doc.txt"), b"B").unwrap();

        assert_eq!(first.identifier, second.identifier);
        assert_ne!(first.checksum, second.checksum);
        assert_eq!(identity.len(), 1);
        assert_eq!(
            engine.checksum_of(&rel("doc.txt")).unwrap(),
            second.checksum
        );
    }

    #[test]
    fn test_store_over_untracked_file_is_inconsistency() {
        let (temp, engine, _, _) = create_engine();
        fs::write(temp.path().join("stray.txt"), b"x").unwrap();

        let result = engine.store(&rel("stray.txt"), b"y");

        assert!(matches!(result, Err(DepotError::MissingIdentity { .. })));
    }

    #[test]
    fn test_store_disk_failure_leaves_indices_untouched() {
        let (temp, engine, identity, checksums) = create_engine();
        // A regular file where a parent directory is needed.
        fs::write(temp.path().join("blocker"), b"x").unwrap();

        let result = engine.store(&rel("blocker/inner.txt"), b"data");

        assert!(matches!(result, Err(DepotError::Files(_))));
        assert!(identity.is_empty());
        assert!(checksums.is_empty());
    }

    #[test]
    fn test_store_index_failure_is_partial() {
        let temp = TempDir::new().unwrap();
        let files = LocalFileSystem::new(temp.path()).unwrap();
        let identity = MemoryStore::new();
        let engine = MetadataEngine::new(
            Arc::new(files),
            Arc::new(identity.clone()),
            Arc::new(FailingStore),
        );

        let result = engine.store(&rel("a.txt"), b"data");

        match result {
            Err(DepotError::PartialIndexUpdate { path, failures }) => {
                assert_eq!(path.as_str(), "a.txt");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].index, IndexKind::Checksum);
            }
            other => panic!("expected PartialIndexUpdate, got {:?}", other),
        }
        // The disk write is not rolled back, the identity write went through.
        assert!(temp.path().join("a.txt").exists());
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_find_identity_by_path_exact_match() {
        let (_temp, engine, _, _) = create_engine();
        let record = engine.store(&rel("a/x.txt"), b"x").unwrap();
        engine.store(&rel("a/x.txt.bak"), b"y").unwrap();

        assert_eq!(
            engine.find_identity_by_path(&rel("a/x.txt")).unwrap(),
            Some(record.identifier)
        );
        assert_eq!(engine.find_identity_by_path(&rel("a")).unwrap(), None);
        assert_eq!(engine.find_identity_by_path(&rel("missing")).unwrap(), None);
    }

    #[test]
    fn test_move_directory_propagates() {
        let (temp, engine, identity, checksums) = create_engine();
        let x = engine.store(&rel("a/x.txt"), b"x").unwrap();
        let y = engine.store(&rel("a/y.txt"), b"y").unwrap();
        let other = engine.store(&rel("ab/z.txt"), b"z").unwrap();

        let report = engine.move_path(&rel("a"), &rel("b")).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.identities, 2);
        assert_eq!(report.checksums, 2);
        assert!(temp.path().join("b/x.txt").exists());
        assert!(!temp.path().join("a").exists());

        assert_eq!(engine.path_of(&x.identifier).unwrap(), Some(rel("b/x.txt")));
        assert_eq!(engine.path_of(&y.identifier).unwrap(), Some(rel("b/y.txt")));
        assert_eq!(
            engine.path_of(&other.identifier).unwrap(),
            Some(rel("ab/z.txt"))
        );
        assert_eq!(engine.checksum_of(&rel("b/x.txt")).unwrap(), x.checksum);
        assert_eq!(engine.checksum_of(&rel("b/y.txt")).unwrap(), y.checksum);
        assert!(checksums.get(b"a/x.txt").unwrap().is_none());
        assert!(checksums.get(b"a/y.txt").unwrap().is_none());
        assert_eq!(identity.len(), 3);
        assert_eq!(checksums.len(), 3);
    }

    #[test]
    fn test_move_single_file_into_new_directory() {
        let (temp, engine, _, _) = create_engine();
        let record = engine.store(&rel("report.pdf"), b"%PDF").unwrap();

        engine
            .move_path(&rel("report.pdf"), &rel("archive/2021/report.pdf"))
            .unwrap();

        assert!(temp.path().join("archive/2021/report.pdf").exists());
        assert_eq!(
            engine.path_of(&record.identifier).unwrap(),
            Some(rel("archive/2021/report.pdf"))
        );
        assert_eq!(
            engine.checksum_of(&rel("archive/2021/report.pdf")).unwrap(),
            record.checksum
        );
        assert!(engine.checksum_of(&rel("report.pdf")).unwrap().is_none());
    }

    #[test]
    fn test_move_onto_existing_file_keeps_one_identity() {
        let (temp, engine, identity, checksums) = create_engine();
        let x = engine.store(&rel("x.txt"), b"x").unwrap();
        let y = engine.store(&rel("y.txt"), b"y").unwrap();

        let report = engine.move_path(&rel("x.txt"), &rel("y.txt")).unwrap();

        assert!(report.is_clean());
        assert_eq!(fs::read(temp.path().join("y.txt")).unwrap(), b"x");
        assert_eq!(engine.path_of(&x.identifier).unwrap(), Some(rel("y.txt")));
        assert_eq!(engine.path_of(&y.identifier).unwrap(), None);
        assert_eq!(
            engine.find_identity_by_path(&rel("y.txt")).unwrap(),
            Some(x.identifier)
        );
        assert_eq!(engine.checksum_of(&rel("y.txt")).unwrap(), x.checksum);
        assert_eq!(identity.len(), 1);
        assert_eq!(checksums.len(), 1);
        assert_eq!(engine.dump().unwrap().records.len(), 1);
    }

    #[test]
    fn test_move_into_itself_rejected() {
        let (_temp, engine, _, _) = create_engine();
        engine.store(&rel("a/x.txt"), b"x").unwrap();

        let result = engine.move_path(&rel("a"), &rel("a/b"));
        assert!(matches!(result, Err(DepotError::InvalidInput(_))));
    }

    #[test]
    fn test_move_missing_source_fails_without_index_changes() {
        let (_temp, engine, identity, _) = create_engine();
        engine.store(&rel("keep.txt"), b"k").unwrap();

        let result = engine.move_path(&rel("missing.txt"), &rel("other.txt"));

        assert!(matches!(result, Err(DepotError::Files(_))));
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_move_checksum_single_key() {
        let (_temp, engine, _, checksums) = create_engine();
        let record = engine.store(&rel("testdir/testFile.txt"), b"test data").unwrap();

        engine
            .move_checksum(&rel("testdir/testFile.txt"), &rel("testdir/testFile2.txt"))
            .unwrap();

        assert_eq!(
            engine.checksum_of(&rel("testdir/testFile2.txt")).unwrap(),
            record.checksum
        );
        assert!(checksums.get(b"testdir/testFile.txt").unwrap().is_none());
    }

    #[test]
    fn test_move_checksum_missing_source() {
        let (_temp, engine, _, _) = create_engine();
        let result = engine.move_checksum(&rel("nothing"), &rel("else"));
        assert!(matches!(result, Err(DepotError::ChecksumNotFound { .. })));
    }

    #[test]
    fn test_delete_directory_propagates() {
        let (temp, engine, identity, checksums) = create_engine();
        engine.store(&rel("dir/a.txt"), b"a").unwrap();
        engine.store(&rel("dir/sub/b.txt"), b"b").unwrap();
        let keep = engine.store(&rel("dirty.txt"), b"c").unwrap();

        let report = engine.delete(&rel("dir")).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.identities, 2);
        assert!(!temp.path().join("dir").exists());
        assert_eq!(identity.len(), 1);
        assert_eq!(checksums.len(), 1);
        assert_eq!(
            engine.path_of(&keep.identifier).unwrap(),
            Some(rel("dirty.txt"))
        );
    }

    #[test]
    fn test_delete_single_file_removes_identifier() {
        let (_temp, engine, _, _) = create_engine();
        let record = engine.store(&rel("gone.txt"), b"bye").unwrap();

        engine.delete(&rel("gone.txt")).unwrap();

        assert!(engine.path_of(&record.identifier).unwrap().is_none());
        assert!(engine.checksum_of(&rel("gone.txt")).unwrap().is_none());
    }

    #[test]
    fn test_delete_absent_path_cleans_stale_entries() {
        let (_temp, engine, identity, checksums) = create_engine();
        identity.put(b"stale-id", b"ghost/file.txt").unwrap();
        checksums.put(b"ghost/file.txt", b"x").unwrap();

        let report = engine.delete(&rel("ghost")).unwrap();

        assert_eq!(report.identities, 1);
        assert!(identity.is_empty());
        assert!(checksums.is_empty());
    }

    #[test]
    fn test_store_after_delete_gets_new_identifier() {
        let (_temp, engine, _, _) = create_engine();
        let first = engine.store(&rel("f.txt"), b"1").unwrap();
        engine.delete(&rel("f.txt")).unwrap();
        let second = engine.store(&rel("f.txt"), b"1").unwrap();

        assert_ne!(first.identifier, second.identifier);
    }

    #[test]
    fn test_restore_then_dump_is_equal() {
        let (_temp, engine, _, _) = create_engine();
        let records: Vec<FileRecord> = (0..5)
            .map(|i| FileRecord {
                path: rel(&format!("restored/{}.txt", i)),
                identifier: FileId::new(),
                checksum: Some(sha256_hex(format!("content {}", i).as_bytes())),
            })
            .collect();

        let errors = engine.restore(&records);
        assert!(errors.is_empty());

        let outcome = engine.dump().unwrap();
        assert!(outcome.is_complete());

        let expected: HashSet<FileRecord> = records.into_iter().collect();
        let actual: HashSet<FileRecord> = outcome.records.into_iter().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_restore_without_checksum_is_reported_by_dump() {
        let (_temp, engine, _, checksums) = create_engine();
        let record = FileRecord {
            path: rel("legacy.txt"),
            identifier: FileId::parse("0b6f5a1e-6a3c-4c1e-9d7e-3d3b1f8c2a11").unwrap(),
            checksum: None,
        };

        assert!(engine.restore(std::slice::from_ref(&record)).is_empty());
        assert!(checksums.is_empty());

        let outcome = engine.dump().unwrap();
        assert_eq!(outcome.records, vec![record]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            DepotError::MissingChecksum { .. }
        ));
    }

    #[test]
    fn test_restore_collects_failures() {
        let temp = TempDir::new().unwrap();
        let files = LocalFileSystem::new(temp.path()).unwrap();
        let engine = MetadataEngine::new(
            Arc::new(files),
            Arc::new(MemoryStore::new()),
            Arc::new(FailingStore),
        );
        let records: Vec<FileRecord> = (0..3)
            .map(|i| FileRecord {
                path: rel(&format!("{}.txt", i)),
                identifier: FileId::new(),
                checksum: Some(sha256_hex(b"x")),
            })
            .collect();

        let errors = engine.restore(&records);

        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.index == IndexKind::Checksum));
    }

    #[test]
    fn test_bulk_store_then_dump() {
        let (_temp, engine, _, _) = create_engine();
        let files: Vec<(RelativePath, Vec<u8>)> = (0..10)
            .map(|i| {
                (
                    rel(&format!("bulk/file{}.txt", i)),
                    format!("payload {}", i).into_bytes(),
                )
            })
            .collect();

        let outcome = engine.store_many(files);
        assert!(outcome.ok());
        assert_eq!(outcome.files.len(), 10);

        let dump = engine.dump().unwrap();
        assert!(dump.is_complete());
        assert_eq!(dump.records.len(), 10);

        let stored: HashSet<(FileId, RelativePath)> = outcome
            .files
            .iter()
            .map(|r| (r.identifier.clone(), r.path.clone()))
            .collect();
        for record in &dump.records {
            assert!(record.checksum.is_some());
            assert!(stored.contains(&(record.identifier.clone(), record.path.clone())));
        }
    }

    #[test]
    fn test_bulk_store_many_more_paths_than_workers() {
        let (_temp, engine, identity, checksums) = create_engine();
        let files: Vec<(RelativePath, Vec<u8>)> = (0..2000)
            .map(|i| (rel(&format!("tiny/{}.txt", i)), vec![b'x']))
            .collect();

        let outcome = engine.store_many(files);

        assert!(outcome.ok());
        assert_eq!(outcome.files.len(), 2000);
        assert_eq!(identity.len(), 2000);
        assert_eq!(checksums.len(), 2000);
    }

    #[test]
    fn test_bulk_store_empty_request() {
        let (_temp, engine, _, _) = create_engine();
        let outcome = engine.store_many(Vec::new());
        assert!(outcome.ok());
        assert!(outcome.files.is_empty());
    }

    #[test]
    fn test_bulk_store_duplicate_paths_share_identifier() {
        let (_temp, engine, identity, _) = create_engine();

        let outcome = engine.store_many(vec![
            (rel("same.txt"), b"one".to_vec()),
            (rel("same.txt"), b"two".to_vec()),
        ]);

        assert!(outcome.ok());
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files[0].identifier, outcome.files[1].identifier);
        assert_eq!(identity.len(), 1);
        assert_eq!(
            engine.files().read_file(&rel("same.txt")).unwrap(),
            b"two"
        );
    }

    #[test]
    fn test_bulk_store_reports_partial_failure() {
        let (temp, engine, _, _) = create_engine();
        fs::write(temp.path().join("blocker"), b"x").unwrap();

        let outcome = engine.store_many(vec![
            (rel("ok.txt"), b"fine".to_vec()),
            (rel("blocker/bad.txt"), b"nope".to_vec()),
        ]);

        assert!(!outcome.ok());
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path.as_str(), "blocker/bad.txt");
    }

    #[test]
    fn test_read_by_identifier() {
        let (_temp, engine, _, _) = create_engine();
        let record = engine.store(&rel("r.bin"), &[0, 1, 2, 255]).unwrap();

        let (path, content) = engine.read(&record.identifier).unwrap().unwrap();
        assert_eq!(path.as_str(), "r.bin");
        assert_eq!(content, vec![0, 1, 2, 255]);

        assert!(engine.read(&FileId::new()).unwrap().is_none());
    }

    #[test]
    fn test_dump_reports_corrupt_entries() {
        let (_temp, engine, identity, _) = create_engine();
        identity.put(b"bad-path", b"../escape").unwrap();
        engine.store(&rel("fine.txt"), b"ok").unwrap();

        let outcome = engine.dump().unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            DepotError::CorruptEntry { .. }
        ));
    }

    #[test]
    fn test_sled_backed_engine_persists() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();

        let record = {
            let engine = MetadataEngine::new(
                Arc::new(LocalFileSystem::new(&root).unwrap()),
                Arc::new(SledStore::open(&temp.path().join("ids")).unwrap()),
                Arc::new(SledStore::open(&temp.path().join("sha256sum")).unwrap()),
            );
            let record = engine.store(&rel("kept.txt"), b"durable").unwrap();
            engine.flush().unwrap();
            record
        };

        let engine = MetadataEngine::new(
            Arc::new(LocalFileSystem::new(&root).unwrap()),
            Arc::new(SledStore::open(&temp.path().join("ids")).unwrap()),
            Arc::new(SledStore::open(&temp.path().join("sha256sum")).unwrap()),
        );
        assert_eq!(
            engine.find_identity_by_path(&rel("kept.txt")).unwrap(),
            Some(record.identifier)
        );
    }
}
