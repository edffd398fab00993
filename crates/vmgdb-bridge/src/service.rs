//! Composition root: one session wired to its snapshot store and relay endpoint.
//!
//! An embedding binary supplies the emulator and the host channels; [`Bridge`]
//! does the rest:
//!
//! ```text
//! SessionConfig ──► open_or_none ──► SnapshotCache ─┐
//!               └─► RelayEndpoint::bind ────────────┤
//!                                                   ▼
//!                  host channels ◄──► SessionOrchestrator ◄──► RelayEndpoint ◄──► relay
//! ```
//!
//! [`Bridge::run`] returns once the emulator's event stream closes.  The
//! relay endpoint stops on its own when the session drops its relay sender.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{atomic::AtomicBool, Arc};

use anyhow::Context;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};
use uuid::Uuid;

use vmgdb_core::{HostInbound, HostOutbound, RelayInbound, RelayOutbound};

use crate::application::emulator::{Emulator, EmulatorEvent};
use crate::application::orchestrator::SessionOrchestrator;
use crate::application::snapshot_cache::SnapshotCache;
use crate::domain::config::SessionConfig;
use crate::infrastructure::storage::open_or_none;
use crate::infrastructure::ws_relay::RelayEndpoint;

/// A started session with its relay endpoint bound but not yet serving.
pub struct Bridge {
    session: SessionOrchestrator,
    events: UnboundedReceiver<EmulatorEvent>,
    host_rx: UnboundedReceiver<HostInbound>,
    relay: RelayEndpoint,
    relay_addr: SocketAddr,
    relay_in_tx: UnboundedSender<RelayInbound>,
    relay_in_rx: UnboundedReceiver<RelayInbound>,
    relay_out_rx: UnboundedReceiver<RelayOutbound>,
}

impl Bridge {
    /// Loads the configuration file at `path` and starts a bridge from it.
    /// A missing file selects the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or [`start`](Self::start)
    /// fails.
    pub async fn from_config_file(
        path: &Path,
        emulator: Arc<dyn Emulator>,
        host_tx: UnboundedSender<HostOutbound>,
        host_rx: UnboundedReceiver<HostInbound>,
    ) -> anyhow::Result<Self> {
        let config = SessionConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        Self::start(config, emulator, host_tx, host_rx).await
    }

    /// Opens the snapshot store, binds the relay endpoint and starts the
    /// emulator.
    ///
    /// An unusable cache directory disables snapshots rather than failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay address cannot be bound or the emulator
    /// fails to start.
    pub async fn start(
        config: SessionConfig,
        emulator: Arc<dyn Emulator>,
        host_tx: UnboundedSender<HostOutbound>,
        host_rx: UnboundedReceiver<HostInbound>,
    ) -> anyhow::Result<Self> {
        let store = open_or_none(&config).await;
        let cache = SnapshotCache::new(store, config.image_name.clone());

        let relay = RelayEndpoint::bind(config.relay_bind_addr).await?;
        let relay_addr = relay.local_addr()?;

        let (relay_in_tx, relay_in_rx) = unbounded_channel();
        let (relay_out_tx, relay_out_rx) = unbounded_channel();
        let mut session = SessionOrchestrator::new(config, emulator, cache, host_tx, relay_out_tx);
        let events = session.init().await.context("failed to start session")?;
        info!(session = %session.id(), relay = %relay_addr, "bridge started");

        Ok(Self {
            session,
            events,
            host_rx,
            relay,
            relay_addr,
            relay_in_tx,
            relay_in_rx,
            relay_out_rx,
        })
    }

    /// Address the relay endpoint is bound to.
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    /// Identifier of the underlying session.
    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    /// Serves the relay and runs the session until the emulator stops.
    ///
    /// Clearing `running` stops the relay endpoint early; the session keeps
    /// going without it.
    ///
    /// # Errors
    ///
    /// Returns the session's error, after the relay endpoint has shut down.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            session,
            events,
            host_rx,
            relay,
            relay_addr,
            relay_in_tx,
            relay_in_rx,
            relay_out_rx,
        } = self;

        let relay_task = tokio::spawn(relay.run(relay_in_tx, relay_out_rx, running));
        let outcome = session.run(events, host_rx, relay_in_rx).await;

        // The session has dropped its relay sender by now.
        match relay_task.await {
            Ok(Ok(())) => info!("relay endpoint on {relay_addr} stopped"),
            Ok(Err(e)) => warn!("relay endpoint on {relay_addr} failed: {e:#}"),
            Err(e) => error!("relay endpoint task aborted: {e}"),
        }

        outcome.context("session ended with an error")
    }
}
