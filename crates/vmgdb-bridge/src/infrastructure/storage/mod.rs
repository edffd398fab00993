//! Storage infrastructure: snapshot store adapters.
//!
//! - `fs_store` keeps snapshots as files in the platform cache directory.
//! - `memory` keeps them in a map, for tests and embedders without a disk.

pub mod fs_store;
pub mod memory;

pub use fs_store::{default_cache_root, open_or_none, FsSnapshotStore};
pub use memory::MemorySnapshotStore;
