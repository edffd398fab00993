//! Scriptable emulator for tests and demos.
//!
//! `MockEmulator` implements [`Emulator`] without running a guest.  Tests
//! drive it from the outside:
//!
//! ```ignore
//! let emulator = Arc::new(MockEmulator::new());
//! let mut session = SessionOrchestrator::new(config, emulator.clone(), cache, host_tx, relay_tx);
//! let events = session.init().await?;
//!
//! emulator.push_event(EmulatorEvent::ImageLoaded);
//! emulator.push_console("login: /");
//!
//! assert_eq!(emulator.console_input(), b". /mnt/gdb.sh\n");
//! ```
//!
//! Every capability call is recorded behind a `Mutex` so assertions can
//! inspect exactly what the session did and in what order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::application::emulator::{Emulator, EmulatorError, EmulatorEvent, GuestFiles};
use crate::domain::config::EmulatorConfig;

#[derive(Debug, Default)]
struct MockState {
    events: Option<UnboundedSender<EmulatorEvent>>,
    start_config: Option<EmulatorConfig>,
    run_calls: usize,
    console_input: Vec<u8>,
    debug_input: Vec<u8>,
    files: Vec<(String, Vec<u8>)>,
    restored: Vec<Vec<u8>>,
    serialize_calls: usize,
}

/// A recording [`Emulator`] driven by [`push_event`](MockEmulator::push_event).
#[derive(Debug)]
pub struct MockEmulator {
    state: Mutex<MockState>,
    snapshot: Vec<u8>,
    fail_serialize: bool,
    fail_restore: bool,
    fail_files: bool,
    run_budget: Option<usize>,
}

impl Default for MockEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmulator {
    /// Creates an emulator whose serialized state is `b"machine-state"`.
    pub fn new() -> Self {
        Self::with_snapshot(b"machine-state".to_vec())
    }

    /// Creates an emulator whose serialized state is `snapshot`.
    pub fn with_snapshot(snapshot: Vec<u8>) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            snapshot,
            fail_serialize: false,
            fail_restore: false,
            fail_files: false,
            run_budget: None,
        }
    }

    /// Makes `serialize_state` fail.
    pub fn failing_serialize(mut self) -> Self {
        self.fail_serialize = true;
        self
    }

    /// Makes `deserialize_state` fail.
    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    /// Makes `create_guest_file` fail.
    pub fn failing_files(mut self) -> Self {
        self.fail_files = true;
        self
    }

    /// Lets `run` succeed `ok_calls` times, then fail.
    pub fn failing_run_after(mut self, ok_calls: usize) -> Self {
        self.run_budget = Some(ok_calls);
        self
    }

    /// Delivers one event to the session.  Returns `false` before `start()`
    /// or after the session dropped its receiver.
    pub fn push_event(&self, event: EmulatorEvent) -> bool {
        self.lock()
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Delivers `text` on the console line, one byte per event.
    pub fn push_console(&self, text: &str) {
        for byte in text.bytes() {
            self.push_event(EmulatorEvent::ConsoleByte(byte));
        }
    }

    /// Delivers `text` on the debug line, one byte per event.
    pub fn push_debug(&self, text: &str) {
        for byte in text.bytes() {
            self.push_event(EmulatorEvent::DebugByte(byte));
        }
    }

    /// Closes the event stream, ending the session loop.
    pub fn stop(&self) {
        self.lock().events = None;
    }

    /// Configuration passed to `start()`, if it was called.
    pub fn start_config(&self) -> Option<EmulatorConfig> {
        self.lock().start_config.clone()
    }

    /// Number of `run()` calls.
    pub fn run_calls(&self) -> usize {
        self.lock().run_calls
    }

    /// Bytes written to the console line.
    pub fn console_input(&self) -> Vec<u8> {
        self.lock().console_input.clone()
    }

    /// Bytes written to the debug line.
    pub fn debug_input(&self) -> Vec<u8> {
        self.lock().debug_input.clone()
    }

    /// Guest files created so far, in order.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().files.clone()
    }

    /// Contents of the most recent write to `path`.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .files
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, contents)| contents.clone())
    }

    /// States passed to `deserialize_state`.
    pub fn restored_states(&self) -> Vec<Vec<u8>> {
        self.lock().restored.clone()
    }

    /// Number of `serialize_state` calls.
    pub fn serialize_calls(&self) -> usize {
        self.lock().serialize_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started(&self) -> Result<MutexGuard<'_, MockState>, EmulatorError> {
        let state = self.lock();
        if state.start_config.is_none() {
            return Err(EmulatorError::NotStarted);
        }
        Ok(state)
    }
}

impl GuestFiles for MockEmulator {
    fn create_guest_file(&self, path: &str, contents: &[u8]) -> Result<(), EmulatorError> {
        if self.fail_files {
            return Err(EmulatorError::GuestFile {
                path: path.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        self.started()?
            .files
            .push((path.to_string(), contents.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl Emulator for MockEmulator {
    fn start(
        &self,
        config: &EmulatorConfig,
    ) -> Result<UnboundedReceiver<EmulatorEvent>, EmulatorError> {
        let mut state = self.lock();
        if state.start_config.is_some() {
            return Err(EmulatorError::Start("already started".to_string()));
        }
        let (tx, rx) = unbounded_channel();
        state.events = Some(tx);
        state.start_config = Some(config.clone());
        Ok(rx)
    }

    fn run(&self) -> Result<(), EmulatorError> {
        let mut state = self.started()?;
        state.run_calls += 1;
        if self.run_budget.is_some_and(|budget| state.run_calls > budget) {
            return Err(EmulatorError::Start("mock failure".to_string()));
        }
        Ok(())
    }

    fn send_console_bytes(&self, bytes: &[u8]) -> Result<(), EmulatorError> {
        self.started()?.console_input.extend_from_slice(bytes);
        Ok(())
    }

    fn send_debug_bytes(&self, bytes: &[u8]) -> Result<(), EmulatorError> {
        self.started()?.debug_input.extend_from_slice(bytes);
        Ok(())
    }

    async fn serialize_state(&self) -> Result<Vec<u8>, EmulatorError> {
        self.started()?.serialize_calls += 1;
        if self.fail_serialize {
            return Err(EmulatorError::State("mock failure".to_string()));
        }
        Ok(self.snapshot.clone())
    }

    async fn deserialize_state(&self, state: Vec<u8>) -> Result<(), EmulatorError> {
        if self.fail_restore {
            return Err(EmulatorError::State("mock failure".to_string()));
        }
        self.started()?.restored.push(state);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
