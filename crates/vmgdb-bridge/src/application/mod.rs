//! Application layer for vmgdb-bridge.
//!
//! Use cases that drive one bridge session.  Everything here talks to the
//! outside world through traits (`Emulator`, `GuestFiles`, `SnapshotStore`)
//! so tests can swap in recording fakes.
//!
//! # Sub-modules
//!
//! - **`emulator`** – The capability surface the session needs from the
//!   emulator, and the ordered event stream it produces.
//!
//! - **`snapshot_cache`** – Load and one-shot save of the post-boot machine
//!   state, degrading to a no-op when no store is available.
//!
//! - **`injector`** – Writes the symbol file and sources into the guest
//!   filesystem, requesting the bundle from the relay when it is missing.
//!
//! - **`orchestrator`** – The session loop: consumes emulator events, host
//!   messages and relay messages, and decides what happens next.

pub mod emulator;
pub mod injector;
pub mod orchestrator;
pub mod snapshot_cache;

pub use emulator::{Emulator, EmulatorError, EmulatorEvent, GuestFiles};
pub use injector::{FilesystemInjector, InjectError, InjectOutcome};
pub use orchestrator::{SessionError, SessionOrchestrator};
pub use snapshot_cache::{SnapshotCache, SnapshotStore, SnapshotWriter, StoreError};
