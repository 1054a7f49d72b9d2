//! Snapshot files: a JSON array of [`FileRecord`] used for backup and restore.

use crate::engine::MetadataEngine;
use crate::error::{DepotError, DepotResult, IndexError};
use crate::record::{DumpOutcome, FileRecord};
use std::fs;
use std::path::Path;

/// Reads a snapshot written by [`write_snapshot`] or by an older deployment.
pub fn read_snapshot(path: &Path) -> DepotResult<Vec<FileRecord>> {
    let text = fs::read_to_string(path).map_err(DepotError::SnapshotRead)?;
    serde_json::from_str(&text).map_err(DepotError::SnapshotParse)
}

/// Writes `records` as pretty-printed JSON, creating parent directories as needed.
pub fn write_snapshot(path: &Path, records: &[FileRecord]) -> DepotResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(DepotError::SnapshotWrite)?;
    }
    let json = serde_json::to_string_pretty(records).map_err(DepotError::SnapshotSerialize)?;
    fs::write(path, json).map_err(DepotError::SnapshotWrite)
}

impl MetadataEngine {
    /// Loads a snapshot file into the indices. See [`MetadataEngine::restore`].
    pub fn restore_file(&self, path: &Path) -> DepotResult<Vec<IndexError>> {
        let records = read_snapshot(path)?;
        tracing::info!("restoring {} record(s) from {}", records.len(), path.display());
        Ok(self.restore(&records))
    }

    /// Dumps the indices into a snapshot file.
    ///
    /// The file is written even when some entries could not be resolved; those are returned in
    /// the outcome.
    pub fn dump_to_file(&self, path: &Path) -> DepotResult<DumpOutcome> {
        let outcome = self.dump()?;
        write_snapshot(path, &outcome.records)?;
        tracing::info!(
            "wrote {} record(s) to {}",
            outcome.records.len(),
            path.display()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{create_engine, rel};
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_dump_to_file_then_restore_into_fresh_engine() {
        let (_temp, engine, _, _) = create_engine();
        engine.store(&rel("docs/a.txt"), b"alpha").unwrap();
        engine.store(&rel("docs/b.txt"), b"beta").unwrap();
        engine.store(&rel("c.txt"), b"gamma").unwrap();

        let out = TempDir::new().unwrap();
        let snapshot = out.path().join("backup/meta.json");
        let written = engine.dump_to_file(&snapshot).unwrap();
        assert!(written.is_complete());

        let (_temp2, fresh, identity, checksums) = create_engine();
        let errors = fresh.restore_file(&snapshot).unwrap();
        assert!(errors.is_empty());
        assert_eq!(identity.len(), 3);
        assert_eq!(checksums.len(), 3);

        let before: HashSet<FileRecord> = written.records.into_iter().collect();
        let after: HashSet<FileRecord> = fresh.dump().unwrap().records.into_iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_read_snapshot_legacy_format() {
        let out = TempDir::new().unwrap();
        let snapshot = out.path().join("old.json");
        fs::write(
            &snapshot,
            r#"[{"id": "3f1c2a9e-0d4b-4c7a-8e61-5b2d9f0a7c11", "path": "/photos/cat.jpg",
                 "sha256sum": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"}]"#,
        )
        .unwrap();

        let records = read_snapshot(&snapshot).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path.as_str(), "photos/cat.jpg");
        assert_eq!(
            records[0].identifier.as_str(),
            "3f1c2a9e-0d4b-4c7a-8e61-5b2d9f0a7c11"
        );
    }

    #[test]
    fn test_read_snapshot_errors() {
        let out = TempDir::new().unwrap();

        let missing = read_snapshot(&out.path().join("missing.json"));
        assert!(matches!(missing, Err(DepotError::SnapshotRead(_))));

        let broken = out.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            read_snapshot(&broken),
            Err(DepotError::SnapshotParse(_))
        ));
    }
}
