//! Consistency check between the file tree and both indices.
//!
//! Index writes are not atomic with the disk mutation they follow, so a crash or a failed
//! propagation can leave drift behind. [`MetadataEngine::reconcile`] finds it and, on request,
//! repairs it using the disk as the source of truth.

use crate::engine::{decode_hash, decode_id, decode_path, MetadataEngine};
use crate::error::{DepotError, DepotResult, IndexError, IndexKind, IndexOp};
use depot_files::sha256_hex;
use depot_types::{RelativePath, Sha256Hash};
use depot_uuid::FileId;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

/// Drift found by [`MetadataEngine::reconcile`].
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Files on disk without an identifier
    pub untracked: Vec<RelativePath>,
    /// Identifiers pointing at paths that no longer exist
    pub stale_identities: Vec<(FileId, RelativePath)>,
    /// Checksum entries for paths that no longer exist
    pub stale_checksums: Vec<RelativePath>,
    /// Extra identifiers for a path that already has one
    pub duplicate_identities: Vec<(FileId, RelativePath)>,
    /// Files whose stored checksum differs from their content
    pub mismatched: Vec<RelativePath>,
    /// Tracked files without a checksum entry
    pub missing_checksums: Vec<RelativePath>,
    /// Entries that could not be decoded
    pub corrupt: Vec<DepotError>,
    /// Number of index writes performed by the repair
    pub repaired: usize,
    pub failures: Vec<IndexError>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.untracked.is_empty()
            && self.stale_identities.is_empty()
            && self.stale_checksums.is_empty()
            && self.duplicate_identities.is_empty()
            && self.mismatched.is_empty()
            && self.missing_checksums.is_empty()
            && self.corrupt.is_empty()
    }
}

impl MetadataEngine {
    /// Compares the disk tree with both indices.
    ///
    /// With `repair` set, stale and duplicate entries are removed, untracked files get a fresh
    /// identifier and checksums are recomputed from disk. Corrupt entries are only reported.
    pub fn reconcile(&self, repair: bool) -> DepotResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let on_disk: BTreeSet<RelativePath> = self.files.list_files()?.into_iter().collect();

        let mut raw_identities = Vec::new();
        self.identity
            .fold(&mut |key, value| {
                raw_identities.push((key.to_vec(), value.to_vec()));
                ControlFlow::Continue(())
            })
            .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Fold, "*", e))?;

        let mut raw_checksums = Vec::new();
        self.checksums
            .fold(&mut |key, value| {
                raw_checksums.push((key.to_vec(), value.to_vec()));
                ControlFlow::Continue(())
            })
            .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Fold, "*", e))?;

        let mut tracked: BTreeMap<RelativePath, FileId> = BTreeMap::new();
        for (key, value) in raw_identities {
            let decoded = decode_id(&key).and_then(|id| {
                decode_path(IndexKind::Identity, id.as_str(), &value).map(|path| (id, path))
            });
            let (id, path) = match decoded {
                Ok(pair) => pair,
                Err(e) => {
                    report.corrupt.push(e);
                    continue;
                }
            };

            if !on_disk.contains(&path) {
                report.stale_identities.push((id, path));
            } else if tracked.contains_key(&path) {
                report.duplicate_identities.push((id, path));
            } else {
                tracked.insert(path, id);
            }
        }

        let mut stored: BTreeMap<RelativePath, Sha256Hash> = BTreeMap::new();
        for (key, value) in raw_checksums {
            let key_text = String::from_utf8_lossy(&key).into_owned();
            let decoded = decode_path(IndexKind::Checksum, &key_text, &key)
                .and_then(|path| decode_hash(&key_text, &value).map(|hash| (path, hash)));
            match decoded {
                Ok((path, _)) if !on_disk.contains(&path) => report.stale_checksums.push(path),
                Ok((path, hash)) => {
                    stored.insert(path, hash);
                }
                Err(e) => report.corrupt.push(e),
            }
        }

        let mut recompute: Vec<(RelativePath, Sha256Hash)> = Vec::new();
        for path in &on_disk {
            let actual = sha256_hex(&self.files.read_file(path)?);

            if !tracked.contains_key(path) {
                report.untracked.push(path.clone());
                recompute.push((path.clone(), actual));
                continue;
            }
            match stored.get(path) {
                None => {
                    report.missing_checksums.push(path.clone());
                    recompute.push((path.clone(), actual));
                }
                Some(hash) if *hash != actual => {
                    report.mismatched.push(path.clone());
                    recompute.push((path.clone(), actual));
                }
                Some(_) => {}
            }
        }

        if repair {
            self.repair(&mut report, recompute);
        }

        tracing::info!(
            "reconcile: {} untracked, {} stale identities, {} stale checksums, {} mismatched, {} repaired",
            report.untracked.len(),
            report.stale_identities.len(),
            report.stale_checksums.len(),
            report.mismatched.len(),
            report.repaired
        );
        Ok(report)
    }

    fn repair(&self, report: &mut ReconcileReport, recompute: Vec<(RelativePath, Sha256Hash)>) {
        let stale: Vec<FileId> = report
            .stale_identities
            .iter()
            .chain(report.duplicate_identities.iter())
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            let result = self
                .identity
                .delete(id.as_bytes())
                .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Delete, id.as_str(), e));
            tally(report, result);
        }

        let stale_checksums = report.stale_checksums.clone();
        for path in stale_checksums {
            let result = self
                .checksums
                .delete(path.as_str().as_bytes())
                .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Delete, path.as_str(), e));
            tally(report, result);
        }

        let untracked = report.untracked.clone();
        for path in untracked {
            let id = FileId::new();
            let result = self
                .identity
                .put(id.as_bytes(), path.as_str().as_bytes())
                .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Put, id.as_str(), e));
            tally(report, result);
        }

        for (path, hash) in recompute {
            let result = self
                .checksums
                .put(path.as_str().as_bytes(), hash.as_str().as_bytes())
                .map_err(|e| IndexError::new(IndexKind::Checksum, IndexOp::Put, path.as_str(), e));
            tally(report, result);
        }
    }
}

fn tally(report: &mut ReconcileReport, result: Result<(), IndexError>) {
    match result {
        Ok(()) => report.repaired += 1,
        Err(e) => {
            tracing::warn!("reconcile: {}", e);
            report.failures.push(e);
        }
    }
}
