//! vmgdb-bridge library crate.
//!
//! Runs one bridge session per virtual machine: the guest's console line is
//! relayed to a host terminal once the guest has booted, and its debug line
//! is framed into GDB packets for a remote debugger relay.  After the first
//! boot the machine state is snapshotted so later sessions start at a shell
//! prompt immediately.
//!
//! # Architecture
//!
//! ```text
//!  host (terminal)            relay (debugger frontend)
//!        ↕ HostInbound/Outbound     ↕ RelayInbound/Outbound
//! [vmgdb-bridge]
//!   ├── domain/           SessionConfig, fixed guest layout
//!   ├── application/      Emulator trait, SnapshotCache, FilesystemInjector,
//!   │                     SessionOrchestrator
//!   ├── infrastructure/
//!   │     ├── storage/    File-backed and in-memory snapshot stores
//!   │     ├── emulator/   Scriptable mock emulator
//!   │     └── ws_relay/   WebSocket endpoint for the relay
//!   └── service           Bridge: wires the layers for one session
//!        ↕ EmulatorEvent / capability calls
//!  emulator (serial0 = console, serial1 = debug)
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O.
//! - `application` depends on `domain` and `vmgdb-core`, and reaches the
//!   outside world only through traits and channels.
//! - `infrastructure` implements those traits.
//! - `service` is the only place all three are assembled.

/// Domain layer: configuration and guest layout (no I/O).
pub mod domain;

/// Application layer: the session state machine and its collaborators.
pub mod application;

/// Infrastructure layer: stores, emulator fake, relay transport.
pub mod infrastructure;

/// Composition root for one bridge session.
pub mod service;
