//! Post-boot snapshot persistence.
//!
//! A session that boots the guest from scratch saves the machine state once
//! the shell is interactive.  The next session for the same image restores
//! that state and skips the boot entirely.
//!
//! Caching is an optimisation, never a correctness requirement:
//!
//! - if the persistent store is unavailable, [`SnapshotCache`] behaves as an
//!   empty cache that silently discards writes;
//! - store failures are logged and swallowed;
//! - a session writes at most one snapshot, however often the save trigger
//!   fires.  The one-shot flag is set synchronously by
//!   [`SnapshotCache::begin_save`], before any asynchronous work starts.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Content-type tag stored alongside every snapshot blob.
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/binary";

/// Error type for persistent store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record metadata could not be read or written.
    #[error("invalid snapshot metadata: {0}")]
    Metadata(String),
}

/// A named key-value store holding one binary blob per key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `blob` under `key`, replacing any previous record.
    async fn put(&self, key: &str, blob: &[u8], content_type: &str) -> Result<(), StoreError>;
}

/// One pending snapshot write, detached from the cache so it can run in a
/// background task.
pub struct SnapshotWriter {
    store: Arc<dyn SnapshotStore>,
    key: String,
}

impl SnapshotWriter {
    /// The key the snapshot will be stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes the blob to the store.
    ///
    /// # Errors
    ///
    /// Returns the store's [`StoreError`]; callers are expected to log it.
    pub async fn write(self, blob: &[u8]) -> Result<(), StoreError> {
        self.store.put(&self.key, blob, SNAPSHOT_CONTENT_TYPE).await?;
        info!(key = %self.key, bytes = blob.len(), "snapshot saved to cache");
        Ok(())
    }
}

/// Per-session view of the snapshot store for one guest image.
pub struct SnapshotCache {
    store: Option<Arc<dyn SnapshotStore>>,
    key: String,
    saved: bool,
}

impl SnapshotCache {
    /// Creates a cache for the image `key`.  `store = None` means the
    /// persistent store is unavailable.
    pub fn new(store: Option<Arc<dyn SnapshotStore>>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            saved: false,
        }
    }

    /// Creates a cache with no backing store.
    pub fn disabled(key: impl Into<String>) -> Self {
        Self::new(None, key)
    }

    /// The image name snapshots are keyed by.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `true` if a persistent store is attached.
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// `true` once this session has saved (or decided not to save) a snapshot.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Prevents any save in this session (e.g. the machine was restored).
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Loads the snapshot for this image.
    ///
    /// Returns `None` when there is no record, no store, or the store fails.
    pub async fn load(&self) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        match store.get(&self.key).await {
            Ok(Some(blob)) => {
                info!(key = %self.key, bytes = blob.len(), "snapshot found in cache");
                Some(blob)
            }
            Ok(None) => {
                debug!(key = %self.key, "no cached snapshot");
                None
            }
            Err(e) => {
                warn!(key = %self.key, "snapshot cache unavailable: {e}");
                None
            }
        }
    }

    /// Claims the session's single save.
    ///
    /// Sets the one-shot flag immediately and returns a writer, or `None` if
    /// a save was already claimed or there is no store to write to.
    pub fn begin_save(&mut self) -> Option<SnapshotWriter> {
        if self.saved {
            return None;
        }
        self.saved = true;

        let store = self.store.clone()?;
        Some(SnapshotWriter {
            store,
            key: self.key.clone(),
        })
    }

    /// Saves `blob` unless this session already saved one.
    ///
    /// Returns `true` if the blob reached the store.
    pub async fn save(&mut self, blob: &[u8]) -> bool {
        let Some(writer) = self.begin_save() else {
            return false;
        };
        match writer.write(blob).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %self.key, "failed to save snapshot: {e}");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
