//! Embedded sled backend.
//!
//! sled takes an exclusive lock on its directory, so one [`SledStore`] is opened per index
//! location and shared (it is cheap to clone and safe to use from many threads). Conflicting
//! writes are serialised by sled itself.

use crate::{KeyValueStore, KvError, KvResult, Visitor};
use std::ops::ControlFlow;
use std::path::Path;

#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Opens (or creates) the database at `location`.
    pub fn open(location: &Path) -> KvResult<Self> {
        let db = sled::open(location).map_err(|e| KvError::Open {
            location: location.to_path_buf(),
            source: Box::new(e),
        })?;
        tracing::debug!("opened sled store at {}", location.display());
        Ok(Self { db })
    }
}

fn backend(e: sled::Error) -> KvError {
    KvError::Backend(e.to_string())
}

impl KeyValueStore for SledStore {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.db.insert(key, value).map_err(backend)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.db.get(key).map_err(backend)?.map(|v| v.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.db.remove(key).map_err(backend)?;
        Ok(())
    }

    fn fold(&self, visitor: &mut Visitor<'_>) -> KvResult<()> {
        for entry in self.db.iter() {
            let (key, value) = entry.map_err(backend)?;
            if let ControlFlow::Break(()) = visitor(&key, &value) {
                break;
            }
        }
        Ok(())
    }

    fn flush(&self) -> KvResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }
}
