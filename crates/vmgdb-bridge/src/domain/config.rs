//! Session configuration.
//!
//! [`SessionConfig`] holds every tunable of a bridge session.  It is usually
//! read from a TOML file; every field has a default so an empty (or missing)
//! file yields a working configuration:
//!
//! ```toml
//! image_name = "gdb-10.1-bzImage.bin"
//! bios_path = "bios/seabios.bin"
//! kernel_dir = "images"
//! cmdline = "tsc=reliable mitigations=off random.trust_cpu=on"
//! store_name = "gdb-state-v2"
//! relay_bind_addr = "127.0.0.1:24810"
//! # cache_dir = "/var/cache/vmgdb"
//! ```
//!
//! The guest-side paths (symbol file, launch script) are a fixed contract and
//! live in [`crate::domain::guest`], not here.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for one bridge session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Logical name of the guest image.  Also the snapshot key.
    #[serde(default = "default_image_name")]
    pub image_name: String,

    /// Firmware image handed to the emulator on a cold boot.
    #[serde(default = "default_bios_path")]
    pub bios_path: PathBuf,

    /// Directory holding kernel images; the kernel is `<kernel_dir>/<image_name>`.
    #[serde(default = "default_kernel_dir")]
    pub kernel_dir: PathBuf,

    /// Kernel command line.
    #[serde(default = "default_cmdline")]
    pub cmdline: String,

    /// Root directory for persisted snapshots.  `None` selects the platform
    /// cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Namespace inside the cache directory.  Bump it to invalidate every
    /// stored snapshot at once.
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Address the debugger relay WebSocket endpoint listens on.
    #[serde(default = "default_relay_bind_addr")]
    pub relay_bind_addr: SocketAddr,
}

/// What the emulator needs to start a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Firmware image; `None` when the machine is restored from a snapshot.
    pub bios: Option<PathBuf>,
    /// Kernel image; `None` when the machine is restored from a snapshot.
    pub kernel: Option<PathBuf>,
    /// Kernel command line.
    pub cmdline: String,
    /// Execution starts only after an explicit `run()`.
    pub autostart: bool,
    /// Expose the second serial line (the debug line).
    pub debug_serial: bool,
    /// Expose a host-writable guest filesystem.
    pub guest_filesystem: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_image_name() -> String {
    "gdb-10.1-bzImage.bin".to_string()
}
fn default_bios_path() -> PathBuf {
    PathBuf::from("bios").join("seabios.bin")
}
fn default_kernel_dir() -> PathBuf {
    PathBuf::from("images")
}
fn default_cmdline() -> String {
    "tsc=reliable mitigations=off random.trust_cpu=on".to_string()
}
fn default_store_name() -> String {
    "gdb-state-v2".to_string()
}
fn default_relay_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 24810))
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            image_name: default_image_name(),
            bios_path: default_bios_path(),
            kernel_dir: default_kernel_dir(),
            cmdline: default_cmdline(),
            cache_dir: None,
            store_name: default_store_name(),
            relay_bind_addr: default_relay_bind_addr(),
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or a field
    /// has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the configuration at `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Path of the kernel image for a cold boot.
    pub fn kernel_path(&self) -> PathBuf {
        self.kernel_dir.join(&self.image_name)
    }

    /// Builds the emulator start configuration.
    ///
    /// When `restoring` is set the firmware and kernel are omitted: the
    /// machine state comes from the snapshot instead.
    pub fn emulator_config(&self, restoring: bool) -> EmulatorConfig {
        let (bios, kernel) = if restoring {
            (None, None)
        } else {
            (Some(self.bios_path.clone()), Some(self.kernel_path()))
        };
        EmulatorConfig {
            bios,
            kernel,
            cmdline: self.cmdline.clone(),
            autostart: false,
            debug_serial: true,
            guest_filesystem: true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
