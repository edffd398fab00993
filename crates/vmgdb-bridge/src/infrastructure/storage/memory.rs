//! In-memory snapshot store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::snapshot_cache::{SnapshotStore, StoreError};

/// A [`SnapshotStore`] backed by a `HashMap`.  Counts writes so tests can
/// check the one-save-per-session rule.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: Mutex<HashMap<String, (Vec<u8>, String)>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Content type recorded for `key`, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|(_, content_type)| content_type.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, String)>> {
        // A poisoned map still holds consistent records; keep serving them.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).map(|(blob, _)| blob.clone()))
    }

    async fn put(&self, key: &str, blob: &[u8], content_type: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .insert(key.to_string(), (blob.to_vec(), content_type.to_string()));
        Ok(())
    }
}
