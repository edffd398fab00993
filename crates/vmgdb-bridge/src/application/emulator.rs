//! The emulator capability surface consumed by a session.
//!
//! The CPU/device emulator is an external collaborator.  The bridge needs
//! only a handful of capabilities from it, captured by the [`Emulator`]
//! trait.  Instead of registering callbacks, [`Emulator::start`] hands back a
//! single ordered channel of [`EmulatorEvent`]s so the session can process
//! them one at a time in its own loop.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::domain::config::EmulatorConfig;

/// Error type for emulator capability calls.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// The emulator refused to start.
    #[error("emulator failed to start: {0}")]
    Start(String),

    /// A capability was used before `start()`.
    #[error("emulator not started")]
    NotStarted,

    /// Writing to a serial line failed.
    #[error("serial write failed on line {line}: {reason}")]
    Serial { line: u8, reason: String },

    /// Creating a file in the guest filesystem failed.
    #[error("failed to create guest file {path}: {reason}")]
    GuestFile { path: String, reason: String },

    /// Producing or applying a machine-state snapshot failed.
    #[error("state serialization failed: {0}")]
    State(String),
}

/// One event observed on the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorEvent {
    /// The firmware/kernel (or snapshot target) is loaded; execution has not started.
    ImageLoaded,
    /// Devices are initialised and the machine is running.
    HardwareReady,
    /// One byte written by the guest on the console line (serial0).
    ConsoleByte(u8),
    /// One byte written by the guest on the debug line (serial1).
    DebugByte(u8),
}

/// File-creation slice of the emulator, used by the filesystem injector.
pub trait GuestFiles: Send + Sync {
    /// Creates (or overwrites) `path` in the guest filesystem.
    fn create_guest_file(&self, path: &str, contents: &[u8]) -> Result<(), EmulatorError>;
}

/// Capabilities the session needs from the emulator.
#[async_trait]
pub trait Emulator: GuestFiles {
    /// Loads the machine described by `config` and returns its event stream.
    ///
    /// The stream closes when the emulator stops.
    fn start(
        &self,
        config: &EmulatorConfig,
    ) -> Result<UnboundedReceiver<EmulatorEvent>, EmulatorError>;

    /// Starts (or resumes) guest execution.
    fn run(&self) -> Result<(), EmulatorError>;

    /// Writes bytes to the console line, as if typed.
    fn send_console_bytes(&self, bytes: &[u8]) -> Result<(), EmulatorError>;

    /// Writes bytes to the debug line.
    fn send_debug_bytes(&self, bytes: &[u8]) -> Result<(), EmulatorError>;

    /// Serialises the full machine state.
    async fn serialize_state(&self) -> Result<Vec<u8>, EmulatorError>;

    /// Replaces the machine state with a previously serialised one.
    async fn deserialize_state(&self, state: Vec<u8>) -> Result<(), EmulatorError>;
}
