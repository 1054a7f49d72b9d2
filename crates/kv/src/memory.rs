//! In-memory backend.
//!
//! Does not persist across restarts. Iteration order is key order, although callers must not rely
//! on it.

use crate::{KeyValueStore, KvResult, Visitor};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn fold(&self, visitor: &mut Visitor<'_>) -> KvResult<()> {
        // Snapshot first so a visitor may write back into the same store.
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in &pairs {
            if let ControlFlow::Break(()) = visitor(key, value) {
                break;
            }
        }
        Ok(())
    }
}
