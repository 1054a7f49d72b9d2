//! Key-value store contract for the Depot indices.
//!
//! Both indices (identity and checksum) are plain byte maps. This crate defines the contract they
//! rely on and the backends that honour it:
//!
//! - [`SledStore`]: embedded, crash-durable store used in production
//! - [`MemoryStore`]: `BTreeMap` behind a lock, used by tests and ephemeral deployments
//!
//! The backend is picked at configuration time through [`StorageBackend`] and [`open_store`].
//!
//! ## Contract
//!
//! - `get` on an absent key is `Ok(None)`, never an error
//! - `delete` on an absent key succeeds
//! - `fold` visits every pair in unspecified order; a visitor returning
//!   [`ControlFlow::Break`] stops the iteration and `fold` still returns `Ok(())`

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Errors raised by a key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The backend could not be opened at the given location
    #[error("failed to open store at {location}: {source}", location = location.display())]
    Open {
        location: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any error reported by the backend while serving a request
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type KvResult<T> = std::result::Result<T, KvError>;

/// Visitor signature used by [`KeyValueStore::fold`].
pub type Visitor<'a> = dyn FnMut(&[u8], &[u8]) -> ControlFlow<()> + 'a;

/// Persistent map from byte key to byte value.
pub trait KeyValueStore: Send + Sync {
    /// Inserts or overwrites `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Returns the value stored at `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> KvResult<()>;

    /// Calls `visitor` for every stored pair until it returns `Break`.
    fn fold(&self, visitor: &mut Visitor<'_>) -> KvResult<()>;

    /// Makes prior writes durable.
    fn flush(&self) -> KvResult<()> {
        Ok(())
    }
}

/// Collects every pair for which `keep` returns true.
///
/// Convenience over [`KeyValueStore::fold`] for the full-scan lookups of the engine.
pub fn collect_matching<F>(store: &dyn KeyValueStore, mut keep: F) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>
where
    F: FnMut(&[u8], &[u8]) -> bool,
{
    let mut matched = Vec::new();
    store.fold(&mut |key, value| {
        if keep(key, value) {
            matched.push((key.to_vec(), value.to_vec()));
        }
        ControlFlow::Continue(())
    })?;
    Ok(matched)
}

/// Storage backend selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Sled => f.write_str("sled"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sled" => Ok(StorageBackend::Sled),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(KvError::Backend(format!(
                "unknown storage backend '{}', expected 'sled' or 'memory'",
                other
            ))),
        }
    }
}

/// Opens the store for `backend` at `location`.
///
/// `location` is ignored by the memory backend.
pub fn open_store(backend: StorageBackend, location: &Path) -> KvResult<Arc<dyn KeyValueStore>> {
    tracing::debug!("opening {} store at {}", backend, location.display());
    match backend {
        StorageBackend::Sled => Ok(Arc::new(SledStore::open(location)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
