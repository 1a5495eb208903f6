//! Published path table shared with readers.

use std::sync::{Arc, RwLock};

use super::types::PathTable;

/// Holds the most recently published [`PathTable`].
///
/// The writer swaps in a whole new table; readers clone the `Arc` and keep
/// a consistent view for as long as they hold it.
#[derive(Debug)]
pub struct PathStore {
    current: RwLock<Arc<PathTable>>,
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PathTable::empty())),
        }
    }

    /// Replaces the published table.
    pub fn publish(&self, table: PathTable) {
        let table = Arc::new(table);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = table;
    }

    /// Returns the current table.
    pub fn snapshot(&self) -> Arc<PathTable> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }
}
