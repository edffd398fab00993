//! The per-session orchestrator.
//!
//! [`SessionOrchestrator`] owns one emulator handle and every per-session
//! component, and turns the three inbound streams into actions:
//!
//! ```text
//!  EmulatorEvent ──┐
//!  HostInbound ────┼──► SessionOrchestrator ──► HostOutbound   (console, progress)
//!  RelayInbound ───┘          │                 RelayOutbound  (gdb, requests, break)
//!                             └──► emulator capabilities (serial writes, guest files,
//!                                  state save/restore)
//! ```
//!
//! # Lifecycle
//!
//! 1. [`init`](SessionOrchestrator::init) looks for a post-boot snapshot and
//!    starts the emulator, returning its event stream.
//! 2. On `ImageLoaded` the snapshot (if any) is restored and execution starts.
//! 3. Console bytes drive the [`BootSequencer`]; at the ready transition the
//!    machine state is saved in the background and the debugger is launched
//!    inside the guest.
//! 4. Debug bytes are framed into packets for the relay; relay commands are
//!    written back verbatim.
//!
//! Events are handled strictly one at a time.  The only work that outlives a
//! handler is the snapshot save, which runs in a [`JoinSet`] so console and
//! debug traffic keep flowing while it is pending.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};
use uuid::Uuid;

use vmgdb_core::protocol::codec::encode_raw;
use vmgdb_core::protocol::framer::ACK;
use vmgdb_core::{
    BootSequencer, BootState, HostInbound, HostOutbound, PacketFramer, RelayInbound,
    RelayOutbound, SymbolBundle,
};

use crate::application::emulator::{Emulator, EmulatorError, EmulatorEvent};
use crate::application::injector::{FilesystemInjector, InjectOutcome};
use crate::application::snapshot_cache::{SnapshotCache, StoreError};
use crate::domain::config::SessionConfig;
use crate::domain::guest::{LAUNCH_COMMAND, LAUNCH_SCRIPT, LAUNCH_SCRIPT_PATH};

// ── Progress lines ────────────────────────────────────────────────────────────

/// Reported when a post-boot snapshot was found.
pub const PROGRESS_FROM_CACHE: &str = "✅  System loaded from cache";

/// Reported when the snapshot is about to be restored.
pub const PROGRESS_RESTORING: &str = "✅  Emulator initialized";

/// Reported on a cold boot.
pub const PROGRESS_INSTALLING: &str =
    "👷‍♀️ Installing GDB... This only happens once and can take up to 1 minute.";

/// Reported on the first console output of a cold boot.
pub const PROGRESS_BOOTING: &str = "✅  System booting...";

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that stop a session or fail a background save.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An emulator capability failed.
    #[error(transparent)]
    Emulator(#[from] EmulatorError),

    /// The snapshot store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// One bridge session: one emulator, one boot sequence, one debugger relay.
pub struct SessionOrchestrator {
    id: Uuid,
    span: Span,
    config: SessionConfig,
    emulator: Arc<dyn Emulator>,
    cache: SnapshotCache,
    cached_state: Option<Vec<u8>>,
    boot: BootSequencer,
    framer: PacketFramer,
    injector: FilesystemInjector,
    symbols: SymbolBundle,
    host_tx: UnboundedSender<HostOutbound>,
    relay_tx: UnboundedSender<RelayOutbound>,
    pending_saves: JoinSet<Result<(), SessionError>>,
}

impl SessionOrchestrator {
    /// Creates a session.  Nothing happens until [`init`](Self::init).
    pub fn new(
        config: SessionConfig,
        emulator: Arc<dyn Emulator>,
        cache: SnapshotCache,
        host_tx: UnboundedSender<HostOutbound>,
        relay_tx: UnboundedSender<RelayOutbound>,
    ) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id, image = %config.image_name);
        Self {
            id,
            span,
            config,
            emulator,
            cache,
            cached_state: None,
            boot: BootSequencer::new(),
            framer: PacketFramer::new(),
            injector: FilesystemInjector::new(),
            symbols: SymbolBundle::new(),
            host_tx,
            relay_tx,
            pending_saves: JoinSet::new(),
        }
    }

    /// Unique identifier of this session, used in log spans.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current boot state.
    pub fn boot_state(&self) -> BootState {
        self.boot.state()
    }

    /// `true` while a cached snapshot is waiting to be restored.
    pub fn is_restoring(&self) -> bool {
        self.cached_state.is_some()
    }

    /// Looks up the snapshot and starts the emulator.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Emulator`] if the emulator fails to start.
    pub async fn init(&mut self) -> Result<UnboundedReceiver<EmulatorEvent>, SessionError> {
        let span = self.span.clone();
        async {
            self.cached_state = self.cache.load().await;
            let restoring = self.cached_state.is_some();
            if restoring {
                self.report_progress(PROGRESS_FROM_CACHE);
                self.boot.suppress_boot_notice();
                self.cache.mark_saved();
            }

            let events = self
                .emulator
                .start(&self.config.emulator_config(restoring))?;
            info!(
                restoring,
                cache = self.cache.is_available(),
                "emulator started"
            );
            Ok::<_, SessionError>(events)
        }
        .instrument(span)
        .await
    }

    /// Runs the session loop until the emulator's event stream closes.
    ///
    /// Host and relay channels may close earlier; the session keeps running
    /// without them.  Pending snapshot saves are awaited before returning,
    /// on success and on error alike.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the emulator cannot start execution.
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<EmulatorEvent>,
        mut host_rx: UnboundedReceiver<HostInbound>,
        mut relay_rx: UnboundedReceiver<RelayInbound>,
    ) -> Result<(), SessionError> {
        let span = self.span.clone();
        async move {
            let mut host_open = true;
            let mut relay_open = true;

            let result = loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => {
                            if let Err(e) = self.handle_emulator_event(event).await {
                                break Err(e);
                            }
                        }
                        None => {
                            info!("emulator event stream closed");
                            break Ok(());
                        }
                    },
                    msg = host_rx.recv(), if host_open => match msg {
                        Some(msg) => self.handle_host_message(msg),
                        None => {
                            debug!("host channel closed");
                            host_open = false;
                        }
                    },
                    msg = relay_rx.recv(), if relay_open => match msg {
                        Some(msg) => self.handle_relay_message(msg),
                        None => {
                            debug!("relay channel closed");
                            relay_open = false;
                        }
                    },
                    // join_next() on an empty set resolves to None at once;
                    // the guard keeps this branch from spinning.
                    Some(saved) = self.pending_saves.join_next(), if !self.pending_saves.is_empty() => {
                        log_save_result(saved);
                    }
                }
            };

            // A save already underway still lands when the loop fails.
            self.flush_pending_saves().await;
            result
        }
        .instrument(span)
        .await
    }

    /// Waits for every background snapshot save to finish.
    pub async fn flush_pending_saves(&mut self) {
        while let Some(result) = self.pending_saves.join_next().await {
            log_save_result(result);
        }
    }

    // ── Emulator events ───────────────────────────────────────────────────────

    /// Handles one emulator event.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if guest execution cannot be started.
    pub async fn handle_emulator_event(&mut self, event: EmulatorEvent) -> Result<(), SessionError> {
        match event {
            EmulatorEvent::ImageLoaded => self.on_image_loaded().await?,
            EmulatorEvent::HardwareReady => self.on_hardware_ready(),
            EmulatorEvent::ConsoleByte(byte) => self.on_console_char(char::from(byte)),
            EmulatorEvent::DebugByte(byte) => self.on_debug_byte(byte),
        }
        Ok(())
    }

    async fn on_image_loaded(&mut self) -> Result<(), SessionError> {
        let restored = match self.cached_state.take() {
            Some(state) => {
                self.report_progress(PROGRESS_RESTORING);
                // A bad snapshot still leaves a bootable machine; carry on.
                if let Err(e) = self.emulator.deserialize_state(state).await {
                    warn!("failed to restore snapshot: {e}");
                }
                self.boot.resume_ready();
                true
            }
            None => {
                self.report_progress(PROGRESS_INSTALLING);
                false
            }
        };

        if let Err(e) = self
            .emulator
            .create_guest_file(LAUNCH_SCRIPT_PATH, LAUNCH_SCRIPT.as_bytes())
        {
            warn!("failed to write launch script: {e}");
        }
        self.emulator.run()?;
        info!(restored, "guest execution started");

        if restored {
            self.inject_symbols();
        }
        Ok(())
    }

    fn on_hardware_ready(&mut self) {
        info!("emulator hardware ready");
        if self.injector.is_request_pending() {
            debug!("symbol bundle already requested");
            return;
        }
        self.injector.mark_requested();
        self.request_bundle();
    }

    fn on_console_char(&mut self, c: char) {
        let step = self.boot.on_console_char(c);

        if step.boot_notice {
            self.report_progress(PROGRESS_BOOTING);
        }
        if step.request_symbols {
            self.inject_symbols();
        }
        if step.save_snapshot {
            info!("guest shell is interactive");
            self.spawn_snapshot_save();
        }
        for ch in step.output.chars() {
            self.send_host(HostOutbound::Serial(ch.to_string()));
        }
        if step.launch_debugger {
            self.send_console(LAUNCH_COMMAND);
        }
    }

    fn on_debug_byte(&mut self, byte: u8) {
        if !self.boot.is_ready() {
            trace!(byte, "debug byte before ready, dropped");
            return;
        }

        let outcome = self.framer.feed_byte(byte);
        // Interrupts go out before packets completed by the same byte.
        for _ in 0..outcome.breaks {
            debug!("debugger interrupt");
            self.send_relay(RelayOutbound::Break);
        }
        for packet in outcome.packets {
            // Acknowledge on the line first, then forward.
            self.send_debug(ACK);
            debug!(packet = %packet, "packet to relay");
            self.send_relay(RelayOutbound::Gdb(packet.into_payload()));
        }
    }

    // ── Host and relay messages ───────────────────────────────────────────────

    /// Handles one message from the host.
    pub fn handle_host_message(&mut self, msg: HostInbound) {
        match msg {
            HostInbound::Serial(text) => self.send_console(&text),
            HostInbound::Init => debug!("relay endpoint already attached"),
            HostInbound::Unknown => debug!("ignoring unknown host message"),
        }
    }

    /// Handles one message from the debugger relay.
    pub fn handle_relay_message(&mut self, msg: RelayInbound) {
        match msg {
            RelayInbound::Gdb(command) => {
                debug!(len = command.len(), "command from relay");
                self.send_debug(&command);
            }
            RelayInbound::Elf(elf) => {
                self.symbols.set_elf(elf);
                self.inject_symbols();
            }
            RelayInbound::Sources(sources) => {
                self.symbols.set_sources(sources);
                self.inject_symbols();
            }
            RelayInbound::Unknown => debug!("ignoring unknown relay message"),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn inject_symbols(&mut self) {
        match self.injector.inject(&self.symbols, self.emulator.as_ref()) {
            Ok(InjectOutcome::RequestBundle) => self.request_bundle(),
            Ok(InjectOutcome::AwaitingBundle | InjectOutcome::Injected { .. }) => {}
            Err(e) => warn!("symbol injection failed: {e}"),
        }
    }

    fn request_bundle(&self) {
        debug!("requesting symbol bundle");
        self.send_relay(RelayOutbound::DownloadSources);
        self.send_relay(RelayOutbound::DownloadElf);
    }

    fn spawn_snapshot_save(&mut self) {
        // begin_save() flips the saved flag before the task exists, so a
        // second trigger while this one runs finds nothing to do.
        let Some(writer) = self.cache.begin_save() else {
            debug!(
                key = self.cache.key(),
                available = self.cache.is_available(),
                "snapshot already saved or cache unavailable"
            );
            return;
        };
        info!(key = writer.key(), "saving snapshot in the background");
        let emulator = Arc::clone(&self.emulator);
        self.pending_saves.spawn(
            async move {
                let state = emulator.serialize_state().await?;
                writer.write(&state).await?;
                Ok::<(), SessionError>(())
            }
            .instrument(self.span.clone()),
        );
    }

    fn report_progress(&self, message: &str) {
        info!("{message}");
        self.send_host(HostOutbound::Progress(message.to_string()));
    }

    fn send_host(&self, msg: HostOutbound) {
        if self.host_tx.send(msg).is_err() {
            trace!("host channel closed; dropping message");
        }
    }

    fn send_relay(&self, msg: RelayOutbound) {
        if self.relay_tx.send(msg).is_err() {
            trace!("relay channel closed; dropping message");
        }
    }

    // Serial lines carry bytes; each char is lowered to one Latin-1 byte.
    fn send_console(&self, text: &str) {
        if let Err(e) = self.emulator.send_console_bytes(&encode_raw(text)) {
            warn!("console write failed: {e}");
        }
    }

    fn send_debug(&self, text: &str) {
        if let Err(e) = self.emulator.send_debug_bytes(&encode_raw(text)) {
            warn!("debug line write failed: {e}");
        }
    }
}

fn log_save_result(result: Result<Result<(), SessionError>, JoinError>) {
    match result {
        Ok(Ok(())) => debug!("snapshot save finished"),
        Ok(Err(e)) => warn!("snapshot save failed: {e}"),
        Err(e) => error!("snapshot save task aborted: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    use crate::application::snapshot_cache::{MockSnapshotStore, SnapshotStore};
    use crate::domain::guest::ELF_PATH;
    use crate::infrastructure::emulator::MockEmulator;
    use crate::infrastructure::storage::MemorySnapshotStore;

    struct Harness {
        session: SessionOrchestrator,
        emulator: Arc<MockEmulator>,
        host_rx: UnboundedReceiver<HostOutbound>,
        relay_rx: UnboundedReceiver<RelayOutbound>,
    }

    impl Harness {
        fn new(emulator: MockEmulator, store: Option<Arc<dyn SnapshotStore>>) -> Self {
            let emulator = Arc::new(emulator);
            let config = SessionConfig::default();
            let cache = SnapshotCache::new(store, config.image_name.clone());
            let (host_tx, host_rx) = unbounded_channel();
            let (relay_tx, relay_rx) = unbounded_channel();
            let session = SessionOrchestrator::new(
                config,
                Arc::clone(&emulator) as Arc<dyn Emulator>,
                cache,
                host_tx,
                relay_tx,
            );
            Self {
                session,
                emulator,
                host_rx,
                relay_rx,
            }
        }

        async fn event(&mut self, event: EmulatorEvent) {
            self.session.handle_emulator_event(event).await.unwrap();
        }

        async fn console(&mut self, text: &str) {
            for byte in text.bytes() {
                self.event(EmulatorEvent::ConsoleByte(byte)).await;
            }
        }

        async fn debug(&mut self, text: &str) {
            for byte in text.bytes() {
                self.event(EmulatorEvent::DebugByte(byte)).await;
            }
        }

        fn host_messages(&mut self) -> Vec<HostOutbound> {
            std::iter::from_fn(|| self.host_rx.try_recv().ok()).collect()
        }

        fn relay_messages(&mut self) -> Vec<RelayOutbound> {
            std::iter::from_fn(|| self.relay_rx.try_recv().ok()).collect()
        }

        fn console_text(&mut self) -> String {
            self.host_messages()
                .into_iter()
                .filter_map(|m| match m {
                    HostOutbound::Serial(s) => Some(s),
                    HostOutbound::Progress(_) => None,
                })
                .collect()
        }

        /// Cold-boots the guest up to the interactive shell.
        async fn boot_to_ready(&mut self) {
            let _events = self.session.init().await.unwrap();
            self.event(EmulatorEvent::ImageLoaded).await;
            self.console("Linux version 5.10\n/ # ").await;
            self.console("/").await;
            self.session.flush_pending_saves().await;
        }
    }

    fn progress(text: &str) -> HostOutbound {
        HostOutbound::Progress(text.to_string())
    }

    // ── init / image loaded ───────────────────────────────────────────────────

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = Harness::new(MockEmulator::new(), None);
        let b = Harness::new(MockEmulator::new(), None);

        assert_ne!(a.session.id(), b.session.id());
    }

    #[tokio::test]
    async fn test_cold_init_starts_with_firmware_and_kernel() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), Some(Arc::new(MemorySnapshotStore::new())));

        // Act
        let _events = h.session.init().await.unwrap();

        // Assert
        let config = h.emulator.start_config().unwrap();
        assert!(config.bios.is_some());
        assert!(config.kernel.is_some());
        assert!(!config.autostart);
        assert!(!h.session.is_restoring());
        assert!(h.host_messages().is_empty());
    }

    #[tokio::test]
    async fn test_cold_image_loaded_reports_install_and_runs() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        // Act
        h.event(EmulatorEvent::ImageLoaded).await;

        // Assert
        assert_eq!(h.host_messages(), vec![progress(PROGRESS_INSTALLING)]);
        assert_eq!(
            h.emulator.file(LAUNCH_SCRIPT_PATH),
            Some(LAUNCH_SCRIPT.as_bytes().to_vec())
        );
        assert_eq!(h.emulator.run_calls(), 1);
        assert_eq!(h.session.boot_state(), BootState::Booting);
    }

    #[tokio::test]
    async fn test_cached_init_restores_and_skips_boot() {
        // Arrange
        let store = MemorySnapshotStore::new();
        store
            .put("gdb-10.1-bzImage.bin", b"saved", "application/binary")
            .await
            .unwrap();
        let store = Arc::new(store);
        let mut h = Harness::new(MockEmulator::new(), Some(store.clone()));

        // Act
        let _events = h.session.init().await.unwrap();
        h.event(EmulatorEvent::ImageLoaded).await;

        // Assert
        let config = h.emulator.start_config().unwrap();
        assert!(config.bios.is_none());
        assert!(config.kernel.is_none());
        assert_eq!(h.emulator.restored_states(), vec![b"saved".to_vec()]);
        assert_eq!(h.session.boot_state(), BootState::Ready);
        assert_eq!(
            h.host_messages(),
            vec![progress(PROGRESS_FROM_CACHE), progress(PROGRESS_RESTORING)]
        );
        // Symbols are missing, so the bundle is requested right away.
        assert_eq!(
            h.relay_messages(),
            vec![RelayOutbound::DownloadSources, RelayOutbound::DownloadElf]
        );
        assert_eq!(h.emulator.run_calls(), 1);
    }

    #[tokio::test]
    async fn test_restored_session_never_saves_or_shows_boot_notice() {
        // Arrange
        let store = Arc::new(MemorySnapshotStore::new());
        store.put("gdb-10.1-bzImage.bin", b"s", "t").await.unwrap();
        let mut h = Harness::new(MockEmulator::new(), Some(store.clone()));
        let _events = h.session.init().await.unwrap();
        h.event(EmulatorEvent::ImageLoaded).await;
        h.host_messages();

        // Act
        h.console("/ # /").await;
        h.session.flush_pending_saves().await;

        // Assert
        assert_eq!(store.write_count(), 1);
        assert_eq!(h.emulator.serialize_calls(), 0);
        assert_eq!(h.console_text(), "/ # /");
    }

    #[tokio::test]
    async fn test_restore_failure_keeps_session_alive() {
        let store = Arc::new(MemorySnapshotStore::new());
        store.put("gdb-10.1-bzImage.bin", b"s", "t").await.unwrap();
        let mut h = Harness::new(MockEmulator::new().failing_restore(), Some(store));
        let _events = h.session.init().await.unwrap();

        h.event(EmulatorEvent::ImageLoaded).await;

        assert_eq!(h.emulator.run_calls(), 1);
        assert!(h.session.boot_state() == BootState::Ready);
    }

    #[tokio::test]
    async fn test_launch_script_failure_is_not_fatal() {
        let mut h = Harness::new(MockEmulator::new().failing_files(), None);
        let _events = h.session.init().await.unwrap();

        h.event(EmulatorEvent::ImageLoaded).await;

        assert_eq!(h.emulator.run_calls(), 1);
    }

    // ── hardware ready ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_hardware_ready_requests_bundle_once() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        // Act
        h.event(EmulatorEvent::HardwareReady).await;
        h.event(EmulatorEvent::HardwareReady).await;

        // Assert
        assert_eq!(
            h.relay_messages(),
            vec![RelayOutbound::DownloadSources, RelayOutbound::DownloadElf]
        );
    }

    // ── console line ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_boot_output_is_hidden_until_ready() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();
        h.event(EmulatorEvent::ImageLoaded).await;
        h.host_messages();

        // Act
        h.console("Booting kernel...").await;

        // Assert: only the boot notice, no console text
        assert_eq!(h.host_messages(), vec![progress(PROGRESS_BOOTING)]);
    }

    #[tokio::test]
    async fn test_second_marker_relays_preamble_and_launches_debugger() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();
        h.event(EmulatorEvent::ImageLoaded).await;

        // Act
        h.console("x/y/z").await;

        // Assert
        assert_eq!(h.console_text(), "\r\n/z");
        assert_eq!(h.emulator.console_input(), LAUNCH_COMMAND.as_bytes().to_vec());
        assert_eq!(h.session.boot_state(), BootState::Ready);
    }

    #[tokio::test]
    async fn test_console_output_is_one_message_per_char() {
        let mut h = Harness::new(MockEmulator::new(), None);
        h.boot_to_ready().await;
        h.host_messages();

        h.console("ab").await;

        assert_eq!(
            h.host_messages(),
            vec![
                HostOutbound::Serial("a".to_string()),
                HostOutbound::Serial("b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_marker_requests_symbols_when_missing() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.console("/").await;

        assert_eq!(
            h.relay_messages(),
            vec![RelayOutbound::DownloadSources, RelayOutbound::DownloadElf]
        );
    }

    // ── snapshot save ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ready_transition_saves_snapshot_once() {
        // Arrange
        let store = Arc::new(MemorySnapshotStore::new());
        let mut h = Harness::new(
            MockEmulator::with_snapshot(b"booted".to_vec()),
            Some(store.clone()),
        );

        // Act
        h.boot_to_ready().await;
        h.console("/ /").await;
        h.session.flush_pending_saves().await;

        // Assert
        assert_eq!(store.write_count(), 1);
        assert_eq!(
            store.get("gdb-10.1-bzImage.bin").await.unwrap(),
            Some(b"booted".to_vec())
        );
        assert_eq!(
            store.content_type("gdb-10.1-bzImage.bin").as_deref(),
            Some("application/binary")
        );
    }

    #[tokio::test]
    async fn test_store_write_goes_through_trait_exactly_once() {
        let mut store = MockSnapshotStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_put()
            .withf(|key, _, _| key == "gdb-10.1-bzImage.bin")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut h = Harness::new(MockEmulator::new(), Some(Arc::new(store)));

        h.boot_to_ready().await;
    }

    #[tokio::test]
    async fn test_no_store_skips_serialization() {
        let mut h = Harness::new(MockEmulator::new(), None);

        h.boot_to_ready().await;

        assert_eq!(h.emulator.serialize_calls(), 0);
        assert_eq!(h.session.boot_state(), BootState::Ready);
    }

    #[tokio::test]
    async fn test_serialize_failure_does_not_stop_session() {
        // Arrange
        let store = Arc::new(MemorySnapshotStore::new());
        let mut h = Harness::new(MockEmulator::new().failing_serialize(), Some(store.clone()));

        // Act
        h.boot_to_ready().await;
        h.host_messages();
        h.console("ok").await;

        // Assert
        assert_eq!(store.write_count(), 0);
        assert_eq!(h.console_text(), "ok");
    }

    // ── debug line ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_debug_bytes_before_ready_are_dropped() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.debug("$OK#9a").await;

        assert!(h.relay_messages().is_empty());
        assert!(h.emulator.debug_input().is_empty());
    }

    #[tokio::test]
    async fn test_debug_packet_is_acked_then_forwarded() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        h.boot_to_ready().await;
        h.relay_messages();

        // Act
        h.debug("$T05#b9").await;

        // Assert
        assert_eq!(h.emulator.debug_input(), b"+".to_vec());
        assert_eq!(h.relay_messages(), vec![RelayOutbound::Gdb("T05".to_string())]);
    }

    #[tokio::test]
    async fn test_interrupt_byte_forwards_break() {
        let mut h = Harness::new(MockEmulator::new(), None);
        h.boot_to_ready().await;
        h.relay_messages();

        h.event(EmulatorEvent::DebugByte(0x03)).await;

        assert_eq!(h.relay_messages(), vec![RelayOutbound::Break]);
        assert!(h.emulator.debug_input().is_empty());
    }

    // ── relay and host messages ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_relay_command_is_written_raw_to_debug_line() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.session
            .handle_relay_message(RelayInbound::Gdb("$g#67".to_string()));

        assert_eq!(h.emulator.debug_input(), b"$g#67".to_vec());
    }

    #[tokio::test]
    async fn test_relay_elf_is_injected_into_guest() {
        // Arrange
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        // Act
        h.session
            .handle_relay_message(RelayInbound::Sources(vec![(
                "/src/main.c".to_string(),
                "int main;".to_string(),
            )]));
        h.session
            .handle_relay_message(RelayInbound::Elf("f0VMRg==".to_string()));

        // Assert
        assert_eq!(h.emulator.file(ELF_PATH), Some(b"\x7fELF".to_vec()));
        assert_eq!(h.emulator.file("/main.c"), Some(b"int main;".to_vec()));
    }

    #[tokio::test]
    async fn test_sources_alone_request_missing_elf() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.session
            .handle_relay_message(RelayInbound::Sources(Vec::new()));

        assert_eq!(
            h.relay_messages(),
            vec![RelayOutbound::DownloadSources, RelayOutbound::DownloadElf]
        );
        assert!(h.emulator.files().is_empty());
    }

    #[tokio::test]
    async fn test_host_keystrokes_go_to_console_line() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.session
            .handle_host_message(HostInbound::Serial("ls\r".to_string()));
        h.session.handle_host_message(HostInbound::Init);
        h.session.handle_host_message(HostInbound::Unknown);

        assert_eq!(h.emulator.console_input(), b"ls\r".to_vec());
    }

    #[tokio::test]
    async fn test_host_latin1_keystroke_maps_to_single_byte() {
        let mut h = Harness::new(MockEmulator::new(), None);
        let _events = h.session.init().await.unwrap();

        h.session
            .handle_host_message(HostInbound::Serial("é".to_string()));

        assert_eq!(h.emulator.console_input(), vec![0xE9]);
    }

    // ── run loop ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_run_ends_when_emulator_stream_closes() {
        // Arrange
        let store = Arc::new(MemorySnapshotStore::new());
        let mut h = Harness::new(MockEmulator::new(), Some(store.clone()));
        let events = h.session.init().await.unwrap();
        let (_host_tx, host_rx) = unbounded_channel();
        let (_relay_tx, relay_rx) = unbounded_channel();

        h.emulator.push_event(EmulatorEvent::ImageLoaded);
        h.emulator.push_console("//");
        h.emulator.stop();

        // Act
        let result = h.session.run(events, host_rx, relay_rx).await;

        // Assert: the pending save was awaited before returning
        assert!(result.is_ok());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_run_error_still_awaits_pending_save() {
        // Arrange: the second run() call fails after a save was spawned
        let store = Arc::new(MemorySnapshotStore::new());
        let mut h = Harness::new(MockEmulator::new().failing_run_after(1), Some(store.clone()));
        let events = h.session.init().await.unwrap();
        let (_host_tx, host_rx) = unbounded_channel();
        let (_relay_tx, relay_rx) = unbounded_channel();

        h.emulator.push_event(EmulatorEvent::ImageLoaded);
        h.emulator.push_console("//");
        h.emulator.push_event(EmulatorEvent::ImageLoaded);
        h.emulator.stop();

        // Act
        let result = h.session.run(events, host_rx, relay_rx).await;

        // Assert
        assert!(matches!(result, Err(SessionError::Emulator(EmulatorError::Start(_)))));
        assert_eq!(store.write_count(), 1);
    }
}
