//! Directory-backed snapshot store.
//!
//! Records live under `<root>/<store_name>/`:
//!
//! ```text
//! gdb-state-v2/
//!   gdb-10.1-bzImage.bin.bin        snapshot blob
//!   gdb-10.1-bzImage.bin.meta.json  {"content_type": "...", "size": N}
//! ```
//!
//! The metadata sidecar is written after the blob, so a record whose sidecar
//! is missing was never completed and reads as absent.
//!
//! The default root is the platform cache directory:
//! - Windows:  `%LOCALAPPDATA%\vmgdb`
//! - Linux:    `$XDG_CACHE_HOME/vmgdb` or `~/.cache/vmgdb`
//! - macOS:    `~/Library/Caches/vmgdb`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::snapshot_cache::{SnapshotStore, StoreError};
use crate::domain::config::SessionConfig;

/// Name of the per-application directory inside the platform cache root.
const APP_DIR: &str = "vmgdb";

const BLOB_EXT: &str = "bin";
const META_EXT: &str = "meta.json";

/// Sidecar written next to every blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordMeta {
    content_type: String,
    size: u64,
}

/// A [`SnapshotStore`] keeping one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// Opens (creating if needed) the store `store_name` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(root: &Path, store_name: &str) -> Result<Self, StoreError> {
        let dir = root.join(sanitize_key(store_name));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        debug!(dir = %dir.display(), "snapshot store opened");
        Ok(Self { dir })
    }

    /// Directory holding this store's records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", sanitize_key(key)))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let meta_path = self.record_path(key, META_EXT);
        let meta = match read_optional(&meta_path).await? {
            Some(raw) => serde_json::from_slice::<RecordMeta>(&raw)
                .map_err(|e| StoreError::Metadata(format!("{}: {e}", meta_path.display())))?,
            None => return Ok(None),
        };

        let blob_path = self.record_path(key, BLOB_EXT);
        let Some(blob) = read_optional(&blob_path).await? else {
            return Ok(None);
        };
        if blob.len() as u64 != meta.size {
            return Err(StoreError::Metadata(format!(
                "{}: expected {} bytes, found {}",
                blob_path.display(),
                meta.size,
                blob.len()
            )));
        }
        Ok(Some(blob))
    }

    async fn put(&self, key: &str, blob: &[u8], content_type: &str) -> Result<(), StoreError> {
        let meta_path = self.record_path(key, META_EXT);
        remove_if_present(&meta_path).await?;

        let blob_path = self.record_path(key, BLOB_EXT);
        tokio::fs::write(&blob_path, blob)
            .await
            .map_err(|source| StoreError::Io {
                path: blob_path.clone(),
                source,
            })?;

        let meta = RecordMeta {
            content_type: content_type.to_string(),
            size: blob.len() as u64,
        };
        let raw = serde_json::to_vec(&meta).map_err(|e| StoreError::Metadata(e.to_string()))?;
        tokio::fs::write(&meta_path, raw)
            .await
            .map_err(|source| StoreError::Io {
                path: meta_path,
                source,
            })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Opens the store described by `config`, or `None` if it is unavailable.
pub async fn open_or_none(config: &SessionConfig) -> Option<Arc<dyn SnapshotStore>> {
    let Some(root) = config.cache_dir.clone().or_else(default_cache_root) else {
        warn!("no cache directory available; snapshots disabled");
        return None;
    };
    match FsSnapshotStore::open(&root, &config.store_name).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("snapshot store unavailable: {e}");
            None
        }
    }
}

/// Platform cache directory for vmgdb, if one can be determined.
pub fn default_cache_root() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join(APP_DIR))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))?;
        Some(base.join(APP_DIR))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Caches").join(APP_DIR))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(format!(".{APP_DIR}")))
    }
}

/// Maps `key` to a single safe path component.
fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
