//! Domain layer for vmgdb-bridge.
//!
//! Pure types with no I/O: the session configuration and the fixed guest
//! filesystem contract.

pub mod config;
pub mod guest;

pub use config::{ConfigError, EmulatorConfig, SessionConfig};
