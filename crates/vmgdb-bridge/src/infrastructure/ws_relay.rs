//! WebSocket endpoint for the debugger relay.
//!
//! The relay (the debugger frontend) connects here and exchanges tagged JSON
//! text frames with the session:
//!
//! - **Relay → session**: each text frame is decoded as a [`RelayInbound`]
//!   and forwarded on the session's inbound channel.  Frames that do not
//!   parse are logged and skipped; unknown tags decode to
//!   [`RelayInbound::Unknown`] and reach the session, which ignores them.
//! - **Session → relay**: each [`RelayOutbound`] is encoded as one text
//!   frame.  Messages produced while no client is attached stay queued in
//!   the channel and are delivered to the next client.  A message whose send
//!   fails is kept and sent first to the next client.
//!
//! Only one client is served at a time.  The accept loop ends when the
//! session closes its outbound channel or the `running` flag is cleared.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use vmgdb_core::protocol::codec::{decode_json, encode_json};
use vmgdb_core::{RelayInbound, RelayOutbound};

/// How often idle loops re-check the `running` flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Why a client connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientExit {
    /// The client went away; wait for the next one.
    Disconnected,
    /// The session dropped its end of a channel.
    SessionEnded,
    /// `running` was cleared.
    Shutdown,
}

/// A bound relay endpoint, not yet accepting.
pub struct RelayEndpoint {
    listener: TcpListener,
    /// Taken off the outbound channel but not delivered.
    unsent: Option<RelayOutbound>,
}

impl RelayEndpoint {
    /// Binds the endpoint on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind relay endpoint on {addr}"))?;
        Ok(Self {
            listener,
            unsent: None,
        })
    }

    /// Address actually bound (useful with port `0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read relay endpoint address")
    }

    /// Serves relay clients one after another until the session ends or
    /// `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the bound address cannot be read; per-client
    /// errors are logged.
    pub async fn run(
        mut self,
        inbound: UnboundedSender<RelayInbound>,
        mut outbound: UnboundedReceiver<RelayOutbound>,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<()> {
        info!("relay endpoint listening on {}", self.local_addr()?);

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping relay endpoint");
                break;
            }

            // Bounded wait so the flags above and below are re-checked even
            // when no relay ever connects.
            match timeout(POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    info!("relay client connected from {peer_addr}");
                    let exit = serve_client(
                        stream,
                        peer_addr,
                        &inbound,
                        &mut outbound,
                        &mut self.unsent,
                        &running,
                    )
                    .await;
                    match exit {
                        Ok(ClientExit::Disconnected) => {
                            info!("relay client {peer_addr} disconnected");
                        }
                        Ok(ClientExit::SessionEnded) => {
                            info!("session ended; closing relay endpoint");
                            break;
                        }
                        Ok(ClientExit::Shutdown) => break,
                        // One bad client must not take the endpoint down.
                        Err(e) => warn!("relay client {peer_addr} failed: {e:#}"),
                    }
                }
                Ok(Err(e)) => error!("relay accept error: {e}"),
                Err(_) => {
                    // With no client attached, only this poll can notice the
                    // session going away.
                    if outbound.is_closed() {
                        info!("session ended with no relay attached; closing relay endpoint");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

// ── Per-client handler ────────────────────────────────────────────────────────

async fn serve_client(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    inbound: &UnboundedSender<RelayInbound>,
    outbound: &mut UnboundedReceiver<RelayOutbound>,
    unsent: &mut Option<RelayOutbound>,
    running: &AtomicBool,
) -> anyhow::Result<ClientExit> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Whatever the previous client missed goes out before anything new.
    if let Some(msg) = unsent.take() {
        send_frame(&mut ws_tx, peer_addr, msg, unsent).await?;
    }

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                        return Ok(ClientExit::Disconnected);
                    }
                    Some(Err(e)) => {
                        warn!("relay {peer_addr}: WebSocket error: {e}");
                        return Ok(ClientExit::Disconnected);
                    }
                };
                match frame {
                    WsMessage::Text(text) => {
                        let msg: RelayInbound = match decode_json(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                // Keep the connection; the next frame may be fine.
                                warn!("relay {peer_addr}: skipping malformed frame: {e}");
                                continue;
                            }
                        };
                        if inbound.send(msg).is_err() {
                            return Ok(ClientExit::SessionEnded);
                        }
                    }
                    WsMessage::Close(_) => return Ok(ClientExit::Disconnected),
                    WsMessage::Binary(_) => {
                        warn!("relay {peer_addr}: unexpected binary frame (ignored)");
                    }
                    // tungstenite answers pings itself.
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                }
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return Ok(ClientExit::SessionEnded);
                };
                send_frame(&mut ws_tx, peer_addr, msg, unsent).await?;
            }
            _ = sleep(POLL_INTERVAL) => {
                if !running.load(Ordering::Relaxed) {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    return Ok(ClientExit::Shutdown);
                }
            }
        }
    }
}

/// Sends one message as a text frame.  On failure the message is parked in
/// `unsent` for the next client.
async fn send_frame(
    ws_tx: &mut WsSink,
    peer_addr: SocketAddr,
    msg: RelayOutbound,
    unsent: &mut Option<RelayOutbound>,
) -> anyhow::Result<()> {
    let text = encode_json(&msg)?;
    debug!("relay {peer_addr}: sending {text}");
    if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
        *unsent = Some(msg);
        return Err(anyhow::Error::new(e).context(format!("failed to send frame to {peer_addr}")));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
