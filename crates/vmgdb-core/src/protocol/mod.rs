//! Protocol module: debugger packet framing, message shapes and codecs.

pub mod codec;
pub mod framer;
pub mod messages;

pub use codec::{decode_json, decode_raw, encode_json, encode_raw, CodecError};
pub use framer::{DebugPacket, FeedOutcome, PacketFramer};
pub use messages::*;
