//! # vmgdb-core
//!
//! Shared, I/O-free building blocks for the vmgdb serial bridge.
//!
//! A virtual machine exposes two serial lines.  The first carries the guest's
//! console (boot log and shell), the second carries the GDB remote serial
//! protocol spoken by a debugger running inside the guest.  This crate holds
//! the parts of the bridge that are pure state machines and data types:
//!
//! - **`protocol`** – The debugger wire format (`$payload#cc` packets and the
//!   `0x03` interrupt byte) plus the tagged JSON messages exchanged with the
//!   host and the debugger relay.
//!
//! - **`domain`** – The boot detector that watches the console stream and
//!   decides when the guest shell is interactive, and the in-memory symbol
//!   bundle (ELF plus sources) received from the relay.
//!
//! Nothing in here touches sockets, files, or an async runtime; the
//! `vmgdb-bridge` crate wires these pieces to the emulator.

pub mod domain;
pub mod protocol;

pub use domain::boot::{BootSequencer, BootState, BootStep};
pub use domain::symbols::SymbolBundle;
pub use protocol::framer::{DebugPacket, FeedOutcome, PacketFramer};
pub use protocol::messages::{HostInbound, HostOutbound, RelayInbound, RelayOutbound};
