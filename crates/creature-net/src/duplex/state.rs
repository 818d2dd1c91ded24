// ── Connection state broadcasting ──
//
// Replay-then-live fan-out: each subscriber first receives the current
// state, then every later transition in order. Unlike a `watch` channel,
// no intermediate transition is ever coalesced away.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Lifecycle of the control-server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
}

pub(crate) struct StateBroadcaster {
    inner: Mutex<BroadcastInner>,
}

struct BroadcastInner {
    current: ConnectionState,
    subscribers: Vec<mpsc::UnboundedSender<ConnectionState>>,
}

impl StateBroadcaster {
    pub(crate) fn new(initial: ConnectionState) -> Self {
        Self {
            inner: Mutex::new(BroadcastInner {
                current: initial,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BroadcastInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn current(&self) -> ConnectionState {
        self.lock().current
    }

    /// Record a transition and fan it out. Returns `false` if `next` equals
    /// the current state (nothing is sent).
    pub(crate) fn publish(&self, next: ConnectionState) -> bool {
        let mut inner = self.lock();
        if inner.current == next {
            return false;
        }
        tracing::debug!(from = %inner.current, to = %next, "connection state");
        inner.current = next;
        inner.subscribers.retain(|tx| tx.send(next).is_ok());
        true
    }

    pub(crate) fn subscribe(&self) -> StateSubscription {
        let mut inner = self.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        // Sent under the same lock as `publish`, so replay and live
        // transitions can never interleave out of order.
        let _ = tx.send(inner.current);
        inner.subscribers.push(tx);
        StateSubscription { rx }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// One subscriber's view of connection state transitions.
#[derive(Debug)]
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<ConnectionState>,
}

impl StateSubscription {
    /// Wait for the next state. `None` once the client has been dropped.
    pub async fn next(&mut self) -> Option<ConnectionState> {
        self.rx.recv().await
    }

    /// Take an already-delivered state without waiting.
    pub fn try_next(&mut self) -> Option<ConnectionState> {
        self.rx.try_recv().ok()
    }

    /// Wait until `target` is observed. Returns `false` if the stream ends first.
    pub async fn wait_for(&mut self, target: ConnectionState) -> bool {
        while let Some(state) = self.next().await {
            if state == target {
                return true;
            }
        }
        false
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> UnboundedReceiverStream<ConnectionState> {
        UnboundedReceiverStream::new(self.rx)
    }
}
