//! Boot detection for the console line.
//!
//! The guest gives no explicit "I am ready" signal.  Instead, the startup
//! script is known to print the marker character `/` exactly twice before the
//! shell becomes interactive: once for an initial command and once when the
//! prompt is shown.  [`BootSequencer`] counts those markers:
//!
//! ```text
//! Booting ──'/'──► AwaitingSecondMarker ──'/'──► Ready
//! ```
//!
//! Any `/` counts, wherever it appears in the output.  A guest that prints
//! the marker for another reason advances the machine early; that is a known
//! limitation of the heuristic, which is why all of it lives in this one type.
//!
//! The sequencer performs no I/O.  Each call returns a [`BootStep`] that the
//! caller executes in field order.

/// The character whose occurrences drive the boot state machine.
pub const BOOT_MARKER: char = '/';

/// Synthetic line break emitted to the console when the guest becomes ready.
pub const READY_PREAMBLE: &str = "\r\n";

/// Where the guest is in its boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootState {
    /// No marker seen yet.
    #[default]
    Booting,
    /// One marker seen; the next one means the shell is interactive.
    AwaitingSecondMarker,
    /// The shell is interactive.  Terminal state.
    Ready,
}

/// Actions requested by one console character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootStep {
    /// First console output of the session: tell the host the system is booting.
    pub boot_notice: bool,
    /// Fetch (or inject, if already present) the symbol bundle.
    pub request_symbols: bool,
    /// Persist the post-boot machine state.
    pub save_snapshot: bool,
    /// Text to relay to the host console, in order.
    pub output: String,
    /// Start the debugger inside the guest.
    pub launch_debugger: bool,
}

/// State machine observing the console stream.
#[derive(Debug, Default)]
pub struct BootSequencer {
    state: BootState,
    boot_message_shown: bool,
}

impl BootSequencer {
    /// Creates a sequencer for a guest booting from scratch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> BootState {
        self.state
    }

    /// `true` once the shell is interactive.
    pub fn is_ready(&self) -> bool {
        self.state == BootState::Ready
    }

    /// Jumps straight to [`BootState::Ready`] without running the heuristic.
    ///
    /// Used when the machine was restored from a post-boot snapshot; the boot
    /// notice is suppressed as well.
    pub fn resume_ready(&mut self) {
        self.state = BootState::Ready;
        self.boot_message_shown = true;
    }

    /// Suppresses the boot notice without changing state.
    pub fn suppress_boot_notice(&mut self) {
        self.boot_message_shown = true;
    }

    /// Processes one console character.
    pub fn on_console_char(&mut self, c: char) -> BootStep {
        let mut step = BootStep::default();

        if !self.boot_message_shown {
            self.boot_message_shown = true;
            step.boot_notice = true;
        }

        if c == BOOT_MARKER {
            match self.state {
                BootState::Booting => {
                    self.state = BootState::AwaitingSecondMarker;
                    step.request_symbols = true;
                }
                BootState::AwaitingSecondMarker => {
                    self.state = BootState::Ready;
                    step.save_snapshot = true;
                    step.output.push_str(READY_PREAMBLE);
                    step.launch_debugger = true;
                }
                BootState::Ready => {}
            }
        }

        if self.is_ready() {
            step.output.push(c);
        }
        step
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
