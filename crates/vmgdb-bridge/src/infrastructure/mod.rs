//! Infrastructure layer for vmgdb-bridge.
//!
//! Adapters behind the application traits and the relay transport:
//!
//! - **`storage`** – `SnapshotStore` implementations (files, memory).
//! - **`emulator`** – the scriptable `MockEmulator`.
//! - **`ws_relay`** – the WebSocket endpoint the debugger relay connects to.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `vmgdb_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod emulator;
pub mod storage;
pub mod ws_relay;

pub use ws_relay::RelayEndpoint;
