//! Duplex command/telemetry channel to the control server.
//!
//! One long-lived WebSocket carries JSON envelopes in both directions.
//! While connected, two independent tasks run:
//!
//! - the **receive loop** keeps exactly one read outstanding, decodes each
//!   frame into a [`Message`], and dispatches it to the registered
//!   [`MessageProcessor`]. Undecodable frames and unknown commands are
//!   logged and dropped; they never end the loop.
//! - the **ping loop** pings the server on a fixed interval. A failed ping
//!   tears the session down and reports `Disconnected`.
//!
//! The client never reconnects on its own; that policy belongs to the
//! caller, which can watch [`DuplexClient::subscribe_state`] and call
//! [`connect`](DuplexClient::connect) again.
//!
//! ```rust,ignore
//! let client = DuplexClient::new(ServerConfig::new(url));
//! let telemetry = Arc::new(TelemetryQueues::new());
//! client.set_processor(telemetry.clone()).await;
//! client.connect().await?;
//!
//! while let Some(line) = telemetry.logs().dequeue().await {
//!     println!("[{}] {}", line.level, line.message);
//! }
//! ```

mod state;
mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub use state::{ConnectionState, StateSubscription};
pub use telemetry::TelemetryQueues;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::message::{Message, MessageProcessor, dispatch};
use state::StateBroadcaster;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

// ── DuplexClient ─────────────────────────────────────────────────────

/// Client for the control server's WebSocket.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Sends may be issued
/// concurrently from any number of clones.
#[derive(Clone)]
pub struct DuplexClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ServerConfig,
    state: StateBroadcaster,
    processor: RwLock<Option<Arc<dyn MessageProcessor>>>,
    writer: Mutex<Option<WsSink>>,
    session: Mutex<Option<Session>>,
    /// Set when a session ended without an explicit disconnect.
    lost: AtomicBool,
}

struct Session {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl DuplexClient {
    /// Create a client. Does NOT connect -- call [`connect`](Self::connect).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: StateBroadcaster::new(ConnectionState::Disconnected),
                processor: RwLock::new(None),
                writer: Mutex::new(None),
                session: Mutex::new(None),
                lost: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    // ── Dispatch registration ────────────────────────────────────

    /// Register the handler set inbound messages are dispatched to.
    pub async fn set_processor(&self, processor: Arc<dyn MessageProcessor>) {
        *self.inner.processor.write().await = Some(processor);
    }

    pub async fn clear_processor(&self) {
        *self.inner.processor.write().await = None;
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open the WebSocket and start the receive and ping loops.
    ///
    /// Returns immediately if a session is already live. A client whose
    /// previous session was lost reports `Reconnecting` rather than
    /// `Connecting` while the handshake runs.
    pub async fn connect(&self) -> Result<(), Error> {
        self.inner.config.validate()?;
        let mut session = self.inner.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.cancel.is_cancelled()) {
            tracing::debug!("already connected");
            return Ok(());
        }
        // Reap a session that ended on its own (transport error or ping failure).
        if let Some(stale) = session.take() {
            join_all(stale.handles).await;
        }

        let opening = if self.inner.lost.load(Ordering::Acquire) {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.inner.state.publish(opening);

        let url = &self.inner.config.url;
        tracing::info!(url = %url, "connecting to control server");

        let handshake = tokio::time::timeout(
            self.inner.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await;

        let stream = match handshake {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.inner.state.publish(ConnectionState::Disconnected);
                return Err(Error::WebSocketConnect(e.to_string()));
            }
            Err(_) => {
                self.inner.state.publish(ConnectionState::Disconnected);
                return Err(Error::WebSocketConnect(format!(
                    "handshake timed out after {:?}",
                    self.inner.config.connect_timeout
                )));
            }
        };

        let (write, read) = stream.split();
        *self.inner.writer.lock().await = Some(write);
        self.inner.lost.store(false, Ordering::Release);
        self.inner.state.publish(ConnectionState::Connected);

        let cancel = CancellationToken::new();
        let handles = vec![
            tokio::spawn(receive_loop(
                Arc::clone(&self.inner),
                read,
                cancel.clone(),
            )),
            tokio::spawn(ping_loop(
                Arc::clone(&self.inner),
                self.inner.config.ping_interval,
                cancel.clone(),
            )),
        ];
        *session = Some(Session { cancel, handles });

        tracing::info!("connected to control server");
        Ok(())
    }

    /// Tear the connection down immediately.
    ///
    /// Idempotent. Cancels the pending receive, stops the ping loop, clears
    /// the registered processor, and reports `Disconnected`. Once this
    /// returns no handler will be invoked for the old session.
    pub async fn disconnect(&self) {
        self.teardown(false).await;
    }

    /// Close gracefully: report `Closing`, send a close frame, then tear
    /// down as [`disconnect`](Self::disconnect) does.
    pub async fn shutdown(&self) {
        self.teardown(true).await;
    }

    async fn teardown(&self, graceful: bool) {
        let session = self.inner.session.lock().await.take();

        if let Some(session) = session {
            let live = !session.cancel.is_cancelled();
            if live && graceful {
                self.inner.state.publish(ConnectionState::Closing);
            }
            session.cancel.cancel();
            join_all(session.handles).await;

            if let Some(mut writer) = self.inner.writer.lock().await.take() {
                if live && graceful {
                    if let Err(e) = writer.send(WsMessage::Close(None)).await {
                        tracing::debug!(error = %e, "close frame not delivered");
                    }
                }
                let _ = writer.close().await;
            }
        }

        *self.inner.processor.write().await = None;
        self.inner.lost.store(false, Ordering::Release);
        if self.inner.state.publish(ConnectionState::Disconnected) {
            tracing::info!("disconnected from control server");
        }
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Serialize `message` into an envelope and transmit it.
    ///
    /// Failures are returned to the caller; the connection is left as is.
    pub async fn send(&self, message: &Message) -> Result<(), Error> {
        let text = message.encode()?;
        tracing::trace!(command = message.command(), "sending message");
        self.inner.send_frame(WsMessage::Text(text.into())).await
    }

    // ── State ────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to state transitions: the current state first, then every
    /// later transition in order.
    pub fn subscribe_state(&self) -> StateSubscription {
        self.inner.state.subscribe()
    }
}

impl ClientInner {
    async fn send_frame(&self, frame: WsMessage) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(Error::NotConnected)?;
        sink.send(frame).await.map_err(|e| Error::Send(e.to_string()))
    }

    /// Decode one text frame and hand it to the processor.
    async fn route(&self, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable message");
                return;
            }
        };

        if let Message::Unknown { command } = &message {
            tracing::warn!(command = %command, "dropping message with unknown command");
            return;
        }

        let processor = self.processor.read().await.clone();
        match processor {
            Some(processor) => {
                tracing::trace!(command = message.command(), "dispatching message");
                dispatch(processor.as_ref(), message);
            }
            None => tracing::debug!(command = message.command(), "no processor registered"),
        }
    }

    /// Called by a loop that found the transport dead.
    async fn mark_lost(&self, cancel: &CancellationToken) {
        cancel.cancel();
        self.writer.lock().await.take();
        self.lost.store(true, Ordering::Release);
        self.state.publish(ConnectionState::Disconnected);
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "control-server task panicked");
            }
        }
    }
}

// ── Background loops ─────────────────────────────────────────────────

/// Read frames until the transport fails or the session is cancelled.
async fn receive_loop(inner: Arc<ClientInner>, mut read: WsSource, cancel: CancellationToken) {
    let reason = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => inner.route(text.as_str()).await,
            Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => inner.route(text).await,
                Err(e) => tracing::warn!(error = %e, "dropping non-UTF-8 binary frame"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                break frame.map_or_else(
                    || "close frame (no payload)".to_owned(),
                    |cf| format!("close frame (code {}): {}", cf.code, cf.reason),
                );
            }
            Some(Ok(_)) => {
                // Ping/Pong -- tungstenite answers pings itself
                tracing::trace!("control frame");
            }
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_owned(),
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    tracing::warn!(reason = %reason, "control-server connection lost");
    inner.mark_lost(&cancel).await;
}

/// Ping on a fixed interval, independent of message traffic.
async fn ping_loop(inner: Arc<ClientInner>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = inner.send_frame(WsMessage::Ping(Default::default())) => sent,
        };
        if let Err(e) = sent {
            if cancel.is_cancelled() {
                break;
            }
            tracing::warn!(error = %e, "ping failed, connection degraded");
            inner.mark_lost(&cancel).await;
            break;
        }
        tracing::trace!("ping sent");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
