//! Tagged message shapes exchanged by the bridge.
//!
//! The bridge talks to two peers:
//!
//! - the **host**, which renders the console and supplies keystrokes;
//! - the **relay**, which carries debugger packets to and from the remote
//!   debugger frontend and serves the symbol bundle.
//!
//! Every message is a JSON object with a `"type"` tag and, when the message
//! carries a payload, a `"data"` field:
//!
//! ```json
//! {"type":"serial","data":"ls\n"}
//! {"type":"gdb","data":"qSupported"}
//! {"type":"downloadElf"}
//! ```
//!
//! Each direction gets its own enum so that sending a host-only message to
//! the relay (or the reverse) is a compile-time error.  Inbound enums carry an
//! `Unknown` catch-all: tags this version does not understand are ignored
//! rather than treated as a protocol failure, whatever `"data"` they carry.
//! Inbound enums are therefore decoded through [`Envelope`] instead of a
//! derived tagged representation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One source file of the symbol bundle: `(path, text)`.
pub type SourceFile = (String, String);

// ── Host ↔ bridge ─────────────────────────────────────────────────────────────

/// Raw `{"type": ..., "data": ...}` object, before dispatch on the tag.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    /// Decodes the payload as `T`, reporting failures through `E`.
    fn payload<T: DeserializeOwned, E: serde::de::Error>(self) -> Result<T, E> {
        serde_json::from_value(self.data)
            .map_err(|e| E::custom(format!("invalid `{}` payload: {e}", self.tag)))
    }
}

/// Messages the host sends to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum HostInbound {
    /// The debugger relay endpoint has been established.
    ///
    /// The endpoint itself is transport-specific and is handed to the session
    /// out of band; any `"data"` on the wire is ignored.
    Init,

    /// Keystrokes for the console line.
    Serial(String),

    /// Any tag this version does not recognise.
    Unknown,
}

impl<'de> Deserialize<'de> for HostInbound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        match envelope.tag.as_str() {
            "init" => Ok(Self::Init),
            "serial" => envelope.payload().map(Self::Serial),
            _ => Ok(Self::Unknown),
        }
    }
}

/// Messages the bridge sends to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum HostOutbound {
    /// Console output to render.
    Serial(String),

    /// Human-readable status line.
    Progress(String),
}

// ── Relay ↔ bridge ────────────────────────────────────────────────────────────

/// Messages the debugger relay sends to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RelayInbound {
    /// One packet payload from the remote debugger target.
    Gdb(String),

    /// The symbol file, base64-encoded.
    Elf(String),

    /// Source files as `[path, text]` pairs.
    Sources(Vec<SourceFile>),

    /// Any tag this version does not recognise.
    Unknown,
}

impl<'de> Deserialize<'de> for RelayInbound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        match envelope.tag.as_str() {
            "gdb" => envelope.payload().map(Self::Gdb),
            "elf" => envelope.payload().map(Self::Elf),
            "sources" => envelope.payload().map(Self::Sources),
            _ => Ok(Self::Unknown),
        }
    }
}

/// Messages the bridge sends to the debugger relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RelayOutbound {
    /// One complete packet payload from the guest debugger.
    Gdb(String),

    /// Request the symbol file.
    DownloadElf,

    /// Request the source files.
    DownloadSources,

    /// The guest debugger sent an interrupt (Ctrl-C).
    Break,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
