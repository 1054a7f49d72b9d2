//! Thread-safe accumulation of per-file results inside one bulk request.

use parking_lot::Mutex;

/// Append-only collection shared by concurrently running workers.
///
/// Each append is atomic and nothing is lost; no ordering is guaranteed between appenders.
#[derive(Debug)]
pub struct ResultCollector<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for ResultCollector<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ResultCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().extend(items);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Consumes the collector once every worker is done.
    pub fn into_inner(self) -> Vec<T> {
        self.items.into_inner()
    }
}

impl<T: Clone> ResultCollector<T> {
    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}
