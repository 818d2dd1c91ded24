//! Managed connection to the pub/sub broker.
//!
//! [`PubSubConnector`] owns one broker session and protects it with a
//! failure-driven backoff gate. Every `subscribe`/`publish` first consults
//! the gate: while a cool-down is active the call is skipped outright and
//! reported as [`Outcome::Suppressed`]. Otherwise it runs, connecting first
//! if needed, and its result feeds the gate:
//!
//! - success resets the failure count;
//! - failure bumps it (capped) and opens a cool-down of
//!   `min(initial * 2^(failures-1), max)`.
//!
//! Concurrent `connect()` callers share a single in-flight attempt.

mod backoff;
mod mqtt;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;

pub use backoff::{BackoffState, WARN_INTERVAL};
pub use mqtt::{MqttTransport, QoS};

use crate::config::{BackoffPolicy, BrokerConfig};
use crate::error::Error;
use backoff::Admission;

/// One publication received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// What happened to a gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation ran and succeeded.
    Completed,
    /// Skipped: the broker is cooling down after failures.
    Suppressed,
}

// ── Transport seam ───────────────────────────────────────────────────

/// The broker session underneath a [`PubSubConnector`].
pub trait BrokerTransport: Send + Sync + 'static {
    /// Establish a session. Must be a no-op while one is live.
    fn connect(&self) -> impl Future<Output = Result<(), Error>> + Send;

    fn subscribe(&self, topic: &str, qos: QoS) -> impl Future<Output = Result<(), Error>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Close the session and release its resources. Safe without a session.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    fn is_connected(&self) -> bool;

    /// A receiver for every publication delivered from now on.
    fn inbound(&self) -> broadcast::Receiver<InboundMessage>;
}

// ── PubSubConnector ──────────────────────────────────────────────────

type ConnectAttempt = Shared<BoxFuture<'static, Result<(), String>>>;

/// Broker client with deduplicated connects and load-shedding backoff.
///
/// Cheaply cloneable; clones share the session and the backoff state.
pub struct PubSubConnector<T: BrokerTransport = MqttTransport> {
    inner: Arc<ConnectorInner<T>>,
}

struct ConnectorInner<T> {
    transport: T,
    policy: BackoffPolicy,
    backoff: Mutex<BackoffState>,
    inflight: Mutex<Option<ConnectAttempt>>,
}

impl<T: BrokerTransport> Clone for PubSubConnector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl PubSubConnector<MqttTransport> {
    /// MQTT connector for `config`. Does NOT connect.
    pub fn new(config: BrokerConfig) -> Self {
        let policy = config.backoff;
        Self::with_transport(MqttTransport::new(config), policy)
    }
}

impl<T: BrokerTransport> PubSubConnector<T> {
    pub fn with_transport(transport: T, policy: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                transport,
                policy,
                backoff: Mutex::new(BackoffState::default()),
                inflight: Mutex::new(None),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.inner.policy
    }

    /// Connect to the broker.
    ///
    /// Idempotent. If an attempt is already running, this waits for that
    /// attempt instead of starting another.
    pub async fn connect(&self) -> Result<(), Error> {
        if self.inner.transport.is_connected() {
            return Ok(());
        }

        let attempt = {
            let mut inflight = lock(&self.inner.inflight);
            if let Some(existing) = inflight.as_ref() {
                tracing::debug!("joining in-flight broker connect");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let attempt = async move {
                    let result = inner.transport.connect().await.map_err(|e| e.to_string());
                    lock(&inner.inflight).take();
                    result
                }
                .boxed()
                .shared();
                *inflight = Some(attempt.clone());
                attempt
            }
        };

        attempt.await.map_err(Error::BrokerConnect)
    }

    /// Subscribe to `topic`, subject to the backoff gate.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<Outcome, Error> {
        self.gated("subscribe", topic, || self.inner.transport.subscribe(topic, qos))
            .await
    }

    /// Publish `payload` to `topic`, subject to the backoff gate.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<Outcome, Error> {
        let payload = payload.into();
        self.gated("publish", topic, || {
            self.inner.transport.publish(topic, payload, qos, retain)
        })
        .await
    }

    async fn gated<F, Fut>(&self, operation: &'static str, topic: &str, op: F) -> Result<Outcome, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let admission = lock(&self.inner.backoff).admit(Instant::now());
        if let Admission::Suppressed { remaining, warn } = admission {
            if warn {
                tracing::warn!(
                    operation,
                    topic,
                    retry_in_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                    "broker unhealthy, skipping operation"
                );
            } else {
                tracing::trace!(operation, topic, "operation suppressed");
            }
            return Ok(Outcome::Suppressed);
        }

        let result = match self.connect().await {
            Ok(()) => op().await,
            Err(e) => Err(e),
        };

        let mut backoff = lock(&self.inner.backoff);
        match result {
            Ok(()) => {
                backoff.record_success();
                Ok(Outcome::Completed)
            }
            Err(e) => {
                let delay = backoff.record_failure(Instant::now(), &self.inner.policy);
                tracing::debug!(
                    operation,
                    topic,
                    error = %e,
                    failures = backoff.consecutive_failures,
                    cooldown_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "broker operation failed"
                );
                Err(e)
            }
        }
    }

    /// Publications received from the broker from now on.
    pub fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.transport.inbound()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Copy of the current backoff bookkeeping.
    pub fn backoff_snapshot(&self) -> BackoffState {
        *lock(&self.inner.backoff)
    }

    /// Disconnect and release the session. Safe if never connected.
    pub async fn shutdown(&self) {
        self.inner.transport.disconnect().await;
        lock(&self.inner.inflight).take();
        lock(&self.inner.backoff).reset();
        tracing::info!("broker connector shut down");
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
