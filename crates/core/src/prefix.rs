//! Prefix propagation.
//!
//! Renaming or removing a directory on disk affects every indexed file below it, so the indices
//! are rewritten for every entry whose path lies under the affected prefix. Both indices are
//! scanned in full (O(index size)); there is no secondary ordering by path.
//!
//! A path lies under a prefix when it equals the prefix or continues with `/` right after it:
//! `a` covers `a` and `a/x.txt`, never `ab/x.txt`.

use crate::error::{IndexError, IndexKind, IndexOp};
use crate::record::PrefixReport;
use depot_kv::{collect_matching, KeyValueStore};
use depot_types::RelativePath;

/// Returns true if `path` is `prefix` or lies below it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Replaces the leading `old` prefix of `path` with `new`.
///
/// Returns `None` when `path` is not under `old`.
pub fn rebase(path: &str, old: &RelativePath, new: &RelativePath) -> Option<String> {
    if !is_under(path, old.as_str()) {
        return None;
    }
    Some(format!("{}{}", new.as_str(), &path[old.as_str().len()..]))
}

fn under_prefix(prefix: &RelativePath) -> impl Fn(&[u8]) -> bool + '_ {
    move |bytes| {
        std::str::from_utf8(bytes)
            .map(|text| is_under(text, prefix.as_str()))
            .unwrap_or(false)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Rewrites the path stored for every identifier under `old`.
///
/// The identity index is keyed by identifier, so an overwrite is enough; the identifier itself
/// never changes.
pub(crate) fn move_identities(
    identity: &dyn KeyValueStore,
    old: &RelativePath,
    new: &RelativePath,
) -> PrefixReport {
    let mut report = PrefixReport::default();
    let matches_old = under_prefix(old);

    let affected = match collect_matching(identity, |_, path| matches_old(path)) {
        Ok(affected) => affected,
        Err(e) => {
            report.failures.push(IndexError::new(
                IndexKind::Identity,
                IndexOp::Fold,
                old.as_str(),
                e,
            ));
            return report;
        }
    };

    report.identities = affected.len();
    for (id, path) in affected {
        let path = lossy(&path);
        let Some(rebased) = rebase(&path, old, new) else {
            continue;
        };
        if rebased == path {
            continue;
        }
        if let Err(e) = identity.put(&id, rebased.as_bytes()) {
            tracing::warn!("move: identity put for {} failed: {}", rebased, e);
            report
                .failures
                .push(IndexError::new(IndexKind::Identity, IndexOp::Put, lossy(&id), e));
        }
    }

    report
}

/// Lists the identifiers whose file would be replaced by moving `old` onto `new`.
///
/// Entries that are also under `old` travel with the move and are not listed.
pub(crate) fn displaced_identities(
    identity: &dyn KeyValueStore,
    old: &RelativePath,
    new: &RelativePath,
) -> Result<Vec<Vec<u8>>, IndexError> {
    let matches_old = under_prefix(old);
    let matches_new = under_prefix(new);
    collect_matching(identity, |_, path| matches_new(path) && !matches_old(path))
        .map(|found| found.into_iter().map(|(id, _)| id).collect())
        .map_err(|e| IndexError::new(IndexKind::Identity, IndexOp::Fold, new.as_str(), e))
}

/// Deletes the identity entries of files replaced by a move.
pub(crate) fn drop_identities(identity: &dyn KeyValueStore, ids: &[Vec<u8>]) -> PrefixReport {
    let mut report = PrefixReport::default();
    for id in ids {
        if let Err(e) = identity.delete(id) {
            tracing::warn!("move: identity delete for {} failed: {}", lossy(id), e);
            report
                .failures
                .push(IndexError::new(IndexKind::Identity, IndexOp::Delete, lossy(id), e));
        }
    }
    report
}

/// Re-keys every checksum entry under `old` to its path under `new`.
///
/// The checksum index is keyed by path, so each entry becomes an insert of the new key followed
/// by a delete of the stale one.
pub(crate) fn move_checksums(
    checksums: &dyn KeyValueStore,
    old: &RelativePath,
    new: &RelativePath,
) -> PrefixReport {
    let mut report = PrefixReport::default();
    let matches_old = under_prefix(old);

    let affected = match collect_matching(checksums, |path, _| matches_old(path)) {
        Ok(affected) => affected,
        Err(e) => {
            report.failures.push(IndexError::new(
                IndexKind::Checksum,
                IndexOp::Fold,
                old.as_str(),
                e,
            ));
            return report;
        }
    };

    report.checksums = affected.len();
    for (path, hash) in affected {
        let path = lossy(&path);
        let Some(rebased) = rebase(&path, old, new) else {
            continue;
        };
        if rebased == path {
            continue;
        }

        if let Err(e) = checksums.put(rebased.as_bytes(), &hash) {
            tracing::warn!("move: checksum put for {} failed: {}", rebased, e);
            report
                .failures
                .push(IndexError::new(IndexKind::Checksum, IndexOp::Put, rebased, e));
            // Keep the stale entry rather than losing the checksum altogether.
            continue;
        }
        if let Err(e) = checksums.delete(path.as_bytes()) {
            tracing::warn!("move: checksum delete for {} failed: {}", path, e);
            report
                .failures
                .push(IndexError::new(IndexKind::Checksum, IndexOp::Delete, path, e));
        }
    }

    report
}

/// Removes every index entry under `prefix` from both indices.
///
/// Identity matches drive the removal of their checksum entries; a second sweep of the checksum
/// index removes entries that had no identifier. Failures are collected and the loop carries on.
pub(crate) fn remove_under(
    identity: &dyn KeyValueStore,
    checksums: &dyn KeyValueStore,
    prefix: &RelativePath,
) -> PrefixReport {
    let mut report = PrefixReport::default();
    let matches_prefix = under_prefix(prefix);

    match collect_matching(identity, |_, path| matches_prefix(path)) {
        Ok(deletable) => {
            report.identities = deletable.len();
            for (id, path) in deletable {
                match checksums.delete(&path) {
                    Ok(()) => report.checksums += 1,
                    Err(e) => {
                        tracing::warn!("delete: checksum delete for {} failed: {}", lossy(&path), e);
                        report.failures.push(IndexError::new(
                            IndexKind::Checksum,
                            IndexOp::Delete,
                            lossy(&path),
                            e,
                        ));
                    }
                }
                if let Err(e) = identity.delete(&id) {
                    tracing::warn!("delete: identity delete for {} failed: {}", lossy(&id), e);
                    report.failures.push(IndexError::new(
                        IndexKind::Identity,
                        IndexOp::Delete,
                        lossy(&id),
                        e,
                    ));
                }
            }
        }
        Err(e) => report.failures.push(IndexError::new(
            IndexKind::Identity,
            IndexOp::Fold,
            prefix.as_str(),
            e,
        )),
    }

    match collect_matching(checksums, |path, _| matches_prefix(path)) {
        Ok(orphans) => {
            for (path, _) in orphans {
                match checksums.delete(&path) {
                    Ok(()) => report.checksums += 1,
                    Err(e) => report.failures.push(IndexError::new(
                        IndexKind::Checksum,
                        IndexOp::Delete,
                        lossy(&path),
                        e,
                    )),
                }
            }
        }
        Err(e) => report.failures.push(IndexError::new(
            IndexKind::Checksum,
            IndexOp::Fold,
            prefix.as_str(),
            e,
        )),
    }

    report
}
