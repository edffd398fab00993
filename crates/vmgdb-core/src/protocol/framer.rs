//! Incremental framer for the GDB remote serial protocol.
//!
//! Wire format on the debug line:
//! ```text
//! $<payload>#<c1><c2>      one packet, two checksum characters
//! \x03                     out-of-band interrupt (Ctrl-C)
//! ```
//!
//! The framer never validates checksums and never reports malformed input.
//! Anything that is not yet a complete packet stays in the buffer until more
//! bytes arrive.  Every completed packet must be acknowledged with a single
//! `+` on the debug line; the framer only counts them, the caller writes them.

use std::fmt;

use tracing::trace;

use crate::protocol::codec::decode_raw;

/// Marks the beginning of a packet payload.
pub const PACKET_START: char = '$';

/// Marks the end of a packet payload; the checksum follows.
pub const PACKET_END: char = '#';

/// Number of checksum characters after [`PACKET_END`].
pub const CHECKSUM_LEN: usize = 2;

/// The interrupt byte the debugger sends to stop the target.
pub const INTERRUPT: char = '\x03';

/// Acknowledgement written back to the debug line for every completed packet.
pub const ACK: &str = "+";

/// The payload of one complete debugger packet, without markers or checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugPacket(String);

impl DebugPacket {
    /// Wraps a payload string.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// Returns the payload text.
    pub fn payload(&self) -> &str {
        &self.0
    }

    /// Consumes the packet and returns its payload.
    pub fn into_payload(self) -> String {
        self.0
    }
}

impl fmt::Display for DebugPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}#..", self.0)
    }
}

/// Result of one [`PacketFramer::feed`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Packets completed by this call, in stream order.
    pub packets: Vec<DebugPacket>,
    /// Number of interrupt bytes seen in this call.
    pub breaks: usize,
}

impl FeedOutcome {
    /// `true` if at least one interrupt byte was seen.
    pub fn break_signaled(&self) -> bool {
        self.breaks > 0
    }

    /// Number of `+` acknowledgements owed to the debug line.
    pub fn acks(&self) -> usize {
        self.packets.len()
    }

    /// `true` if the call produced neither packets nor breaks.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.breaks == 0
    }
}

/// Accumulates debug-line characters and extracts complete packets.
///
/// # Examples
///
/// ```rust
/// use vmgdb_core::protocol::PacketFramer;
///
/// let mut framer = PacketFramer::new();
/// assert!(framer.feed("$g#6").packets.is_empty());
/// let outcome = framer.feed("7");
/// assert_eq!(outcome.packets[0].payload(), "g");
/// assert_eq!(outcome.acks(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PacketFramer {
    buffer: String,
}

impl PacketFramer {
    /// Creates a framer with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the debug line into the framer.
    ///
    /// Interrupt characters are reported as breaks and never buffered, so
    /// feeding a stream in one call or one character at a time yields the
    /// same packets and the same number of breaks.
    pub fn feed(&mut self, chunk: &str) -> FeedOutcome {
        let mut outcome = FeedOutcome::default();

        for c in chunk.chars() {
            if c == INTERRUPT {
                outcome.breaks += 1;
            } else {
                self.buffer.push(c);
            }
        }

        while let Some(packet) = self.next_packet() {
            trace!(len = packet.payload().len(), "debug packet complete");
            outcome.packets.push(packet);
        }
        outcome
    }

    /// Feeds a single raw byte from the emulator's debug line.
    ///
    /// Bytes are lifted to characters one-to-one (Latin-1).
    pub fn feed_byte(&mut self, byte: u8) -> FeedOutcome {
        self.feed(&decode_raw(&[byte]))
    }

    /// Returns the characters retained for a later call.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Extracts the first complete `$...#XY` window, if any.
    ///
    /// Everything up to and including the second checksum character is
    /// dropped from the buffer, including any noise before the `$`.
    fn next_packet(&mut self) -> Option<DebugPacket> {
        let start = self.buffer.find(PACKET_START)?;
        let end = start + 1 + self.buffer[start + 1..].find(PACKET_END)?;

        let (offset, last) = self.buffer[end + 1..]
            .char_indices()
            .nth(CHECKSUM_LEN - 1)?;
        let consumed = end + 1 + offset + last.len_utf8();

        let payload = self.buffer[start + 1..end].to_string();
        self.buffer.drain(..consumed);
        Some(DebugPacket::new(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(outcome: &FeedOutcome) -> Vec<&str> {
        outcome.packets.iter().map(DebugPacket::payload).collect()
    }

    #[test]
    fn test_single_packet_yields_payload_and_one_ack() {
        // Arrange
        let mut framer = PacketFramer::new();

        // Act
        let outcome = framer.feed("$g#67");

        // Assert
        assert_eq!(payloads(&outcome), vec!["g"]);
        assert_eq!(outcome.acks(), 1);
        assert!(!outcome.break_signaled());
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_two_packets_in_one_chunk_are_emitted_in_order() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("$A#00$B#11");

        assert_eq!(payloads(&outcome), vec!["A", "B"]);
        assert_eq!(outcome.acks(), 2);
    }

    #[test]
    fn test_incomplete_packet_is_retained_until_completed() {
        // Arrange
        let mut framer = PacketFramer::new();

        // Act
        let first = framer.feed("$incomplete");

        // Assert: nothing emitted, buffer preserved verbatim
        assert!(first.is_empty());
        assert_eq!(framer.pending(), "$incomplete");

        // Act: supply the remainder
        let second = framer.feed("#4f");

        // Assert
        assert_eq!(payloads(&second), vec!["incomplete"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_packet_waits_for_both_checksum_characters() {
        let mut framer = PacketFramer::new();

        assert!(framer.feed("$m0,4#").packets.is_empty());
        assert!(framer.feed("f").packets.is_empty());
        assert_eq!(payloads(&framer.feed("d")), vec!["m0,4"]);
    }

    #[test]
    fn test_hash_before_dollar_waits_without_error() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("#xx");

        assert!(outcome.is_empty());
        assert_eq!(framer.pending(), "#xx");
    }

    #[test]
    fn test_noise_before_packet_is_discarded_with_the_packet() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("+#zz$qSupported#37");

        assert_eq!(payloads(&outcome), vec!["qSupported"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_checksum_is_not_validated() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("$c#ZZ");

        assert_eq!(payloads(&outcome), vec!["c"]);
    }

    #[test]
    fn test_empty_payload_is_a_valid_packet() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("$#00");

        assert_eq!(payloads(&outcome), vec![""]);
    }

    #[test]
    fn test_interrupt_signals_break_and_keeps_buffer() {
        // Arrange
        let mut framer = PacketFramer::new();
        framer.feed("$vCont;c");

        // Act
        let outcome = framer.feed("\x03");

        // Assert
        assert!(outcome.break_signaled());
        assert!(outcome.packets.is_empty());
        assert_eq!(framer.pending(), "$vCont;c");
    }

    #[test]
    fn test_interrupt_inside_chunk_is_not_buffered() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("$s\x03#00");

        assert_eq!(outcome.breaks, 1);
        assert_eq!(payloads(&outcome), vec!["s"]);
    }

    #[test]
    fn test_trailing_data_after_packet_is_kept() {
        let mut framer = PacketFramer::new();

        let outcome = framer.feed("$g#67$m10");

        assert_eq!(payloads(&outcome), vec!["g"]);
        assert_eq!(framer.pending(), "$m10");
    }

    #[test]
    fn test_feed_byte_maps_high_bytes_one_to_one() {
        // Arrange
        let mut framer = PacketFramer::new();
        let bytes = [b'$', b'X', 0xFF, 0x80, b'#', b'0', b'0'];

        // Act
        let packets: Vec<DebugPacket> = bytes
            .iter()
            .flat_map(|b| framer.feed_byte(*b).packets)
            .collect();

        // Assert
        assert_eq!(packets.len(), 1);
        let chars: Vec<u32> = packets[0].payload().chars().map(u32::from).collect();
        assert_eq!(chars, vec![u32::from(b'X'), 0xFF, 0x80]);
    }

    #[test]
    fn test_feed_byte_interrupt_reports_break() {
        let mut framer = PacketFramer::new();

        assert!(framer.feed_byte(0x03).break_signaled());
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_display_shows_markers() {
        assert_eq!(DebugPacket::new("g").to_string(), "$g#..");
    }
}
