//! sACN multicast receiver.
//!
//! One [`MulticastReceiver`] owns at most one listening session: a UDP
//! socket joined to the universe's multicast group, drained by a dedicated
//! background task that decodes datagrams and hands frames to a callback.
//!
//! Callbacks run on that task. They must not block -- a slow callback
//! stalls all further delivery for the receiver. Consumers that need a
//! different execution context should forward frames over a channel.
//!
//! ```rust,ignore
//! let receiver = MulticastReceiver::new();
//! receiver
//!     .start(1, None, |frame| println!("{:?}", &frame.slots[..8]), |state| {
//!         tracing::info!(?state, "receiver state");
//!     })
//!     .await?;
//! // ...
//! receiver.stop().await;
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::interfaces::{InterfaceCatalog, SystemInterfaces};
use crate::sacn::{self, Frame, MAX_DATAGRAM_SIZE, SACN_PORT};

const RECV_BUFFER_SIZE: usize = 256 * 1024;

// ── State ────────────────────────────────────────────────────────────

/// Transport lifecycle of a receiver.
///
/// `Idle -> Starting -> Listening -> Idle` on stop, or
/// `Listening -> Failed` when the socket errors. A failed receiver stays
/// failed until `start` is called again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Starting,
    Listening,
    Failed(String),
}

/// Counters for one receiver, across sessions.
#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time receive statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Frames decoded and delivered.
    pub frames: u64,
    /// Datagrams discarded: oversized, undecodable, or for another universe.
    pub dropped: u64,
}

// ── MulticastReceiver ────────────────────────────────────────────────

struct Session {
    universe: u16,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Receives one sACN universe at a time.
pub struct MulticastReceiver {
    catalog: Arc<dyn InterfaceCatalog>,
    session: Mutex<Option<Session>>,
    state: watch::Sender<ReceiverState>,
    counters: Arc<Counters>,
}

impl MulticastReceiver {
    /// Receiver resolving interface names through the host OS.
    pub fn new() -> Self {
        Self::with_catalog(Arc::new(SystemInterfaces))
    }

    /// Receiver resolving interface names through `catalog`.
    pub fn with_catalog(catalog: Arc<dyn InterfaceCatalog>) -> Self {
        let (state, _) = watch::channel(ReceiverState::Idle);
        Self {
            catalog,
            session: Mutex::new(None),
            state,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Join the multicast group for `universe` and start delivering frames.
    ///
    /// `interface` names the NIC to join on; `None` lets the OS pick. Any
    /// session already running on this receiver is stopped first. Socket
    /// and group-join failures are returned; nothing is retried.
    pub async fn start<F, S>(
        &self,
        universe: u16,
        interface: Option<&str>,
        on_frame: F,
        on_state: S,
    ) -> Result<(), Error>
    where
        F: FnMut(&Frame) + Send + 'static,
        S: FnMut(ReceiverState) + Send + 'static,
    {
        if !sacn::is_valid_universe(universe) {
            return Err(Error::invalid_config(
                "universe",
                format!("{universe} is outside 1..=63999"),
            ));
        }

        // Held until the new session is installed.
        let mut slot = self.session.lock().await;
        self.halt(&mut slot).await;
        self.state.send_replace(ReceiverState::Starting);

        let socket = match self.open_socket(universe, interface) {
            Ok(socket) => socket,
            Err(e) => {
                self.state.send_replace(ReceiverState::Failed(e.to_string()));
                return Err(e);
            }
        };

        *slot = Some(self.spawn_session(universe, socket, on_frame, on_state));
        Ok(())
    }

    /// Start a session on a socket the caller has already bound.
    ///
    /// Used where group membership is managed externally, or to feed the
    /// receiver from a unicast socket.
    pub async fn attach<F, S>(&self, universe: u16, socket: UdpSocket, on_frame: F, on_state: S)
    where
        F: FnMut(&Frame) + Send + 'static,
        S: FnMut(ReceiverState) + Send + 'static,
    {
        let mut slot = self.session.lock().await;
        self.halt(&mut slot).await;
        self.state.send_replace(ReceiverState::Starting);
        *slot = Some(self.spawn_session(universe, socket, on_frame, on_state));
    }

    /// Stop the active session, if any.
    ///
    /// Idempotent. When this returns, the receive task has exited: no frame
    /// or state callback from the stopped session can fire afterwards.
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        self.halt(&mut slot).await;
    }

    /// Cancel and join whatever session `slot` holds.
    async fn halt(&self, slot: &mut Option<Session>) {
        let Some(session) = slot.take() else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.handle.await {
            tracing::warn!(error = %e, universe = session.universe, "receive task ended abnormally");
        }
        self.state.send_replace(ReceiverState::Idle);
        tracing::debug!(universe = session.universe, "multicast receiver stopped");
    }

    /// Current transport state.
    pub fn state(&self) -> ReceiverState {
        self.state.borrow().clone()
    }

    /// Watch transport state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ReceiverState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn open_socket(&self, universe: u16, interface: Option<&str>) -> Result<UdpSocket, Error> {
        let group = sacn::multicast_group(universe);
        let iface = match interface {
            Some(name) => self.catalog.resolve_address(name)?,
            None => Ipv4Addr::UNSPECIFIED,
        };

        let socket = bind_multicast(group, iface, SACN_PORT)?;
        tracing::info!(universe, %group, interface = %iface, port = SACN_PORT, "joined sACN universe");
        Ok(socket)
    }

    fn spawn_session<F, S>(&self, universe: u16, socket: UdpSocket, on_frame: F, on_state: S) -> Session
    where
        F: FnMut(&Frame) + Send + 'static,
        S: FnMut(ReceiverState) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(ReceiveTask {
            universe,
            socket,
            cancel: cancel.clone(),
            on_frame,
            on_state,
            state: self.state.clone(),
            counters: Arc::clone(&self.counters),
        }));

        Session {
            universe,
            cancel,
            handle,
        }
    }
}

impl Default for MulticastReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            session.handle.abort();
        }
    }
}

/// Create a non-blocking UDP socket on `port` joined to `group` via `iface`.
fn bind_multicast(group: Ipv4Addr, iface: Ipv4Addr, port: u16) -> Result<UdpSocket, Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    socket
        .join_multicast_v4(&group, &iface)
        .map_err(|source| Error::MulticastJoin {
            group,
            interface: iface,
            source,
        })?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

// ── Background receive task ──────────────────────────────────────────

struct ReceiveTask<F, S> {
    universe: u16,
    socket: UdpSocket,
    cancel: CancellationToken,
    on_frame: F,
    on_state: S,
    state: watch::Sender<ReceiverState>,
    counters: Arc<Counters>,
}

impl<F, S> ReceiveTask<F, S>
where
    S: FnMut(ReceiverState),
{
    fn transition(&mut self, next: ReceiverState) {
        self.state.send_replace(next.clone());
        (self.on_state)(next);
    }
}

async fn receive_loop<F, S>(mut task: ReceiveTask<F, S>)
where
    F: FnMut(&Frame) + Send + 'static,
    S: FnMut(ReceiverState) + Send + 'static,
{
    task.transition(ReceiverState::Listening);

    // One spare byte: anything that fills it was larger than we accept.
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];

    loop {
        let received = tokio::select! {
            biased;
            () = task.cancel.cancelled() => break,
            received = task.socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) if len > MAX_DATAGRAM_SIZE => {
                task.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%from, len, "dropping oversized datagram");
            }
            Ok((len, from)) => match sacn::decode(&buf[..len]) {
                Some(frame) if frame.universe == task.universe => {
                    task.counters.frames.fetch_add(1, Ordering::Relaxed);
                    (task.on_frame)(&frame);
                }
                _ => {
                    task.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(%from, len, "ignoring datagram");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, universe = task.universe, "multicast receive failed");
                task.transition(ReceiverState::Failed(e.to_string()));
                return;
            }
        }
    }

    task.transition(ReceiverState::Idle);
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interfaces::NetworkInterfaceDescriptor;

    struct NoInterfaces;

    impl InterfaceCatalog for NoInterfaces {
        fn list_interfaces(&self) -> Vec<NetworkInterfaceDescriptor> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn rejects_out_of_range_universe() {
        let receiver = MulticastReceiver::new();
        let err = receiver.start(0, None, |_| {}, |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { field: "universe", .. }));
        assert_eq!(receiver.state(), ReceiverState::Idle);
    }

    #[tokio::test]
    async fn unknown_interface_fails_start() {
        let receiver = MulticastReceiver::with_catalog(Arc::new(NoInterfaces));
        let err = receiver
            .start(1, Some("eth9"), |_| {}, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InterfaceNotFound(ref name) if name == "eth9"));
        assert!(matches!(receiver.state(), ReceiverState::Failed(_)));
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let receiver = MulticastReceiver::new();
        receiver.stop().await;
        receiver.stop().await;
        assert_eq!(receiver.state(), ReceiverState::Idle);
        assert_eq!(receiver.stats(), ReceiverStats::default());
    }
}
