// ── MQTT broker transport ──
//
// rumqttc splits a session into a cheap `AsyncClient` handle and an
// `EventLoop` that must be polled to make progress. We poll it ourselves
// until the broker acknowledges the connect, then hand it to a driver task
// that forwards inbound publications and notices when the session ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Transport};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use rumqttc::QoS;

use super::{BrokerTransport, InboundMessage};
use crate::config::BrokerConfig;
use crate::error::Error;

/// Outstanding requests the client may queue before `subscribe`/`publish` wait.
const REQUEST_CAPACITY: usize = 64;
/// Inbound publications buffered per `messages()` receiver.
const INBOUND_CAPACITY: usize = 256;
/// How long `disconnect` lets the driver flush the DISCONNECT packet.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// [`BrokerTransport`] backed by an MQTT 3.1.1 session.
pub struct MqttTransport {
    config: BrokerConfig,
    session: Mutex<Option<MqttSession>>,
    connected: Arc<AtomicBool>,
    inbound: broadcast::Sender<InboundMessage>,
}

struct MqttSession {
    client: AsyncClient,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        Self {
            config,
            session: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            inbound,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn options(&self) -> MqttOptions {
        let cfg = &self.config;
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(cfg.keep_alive);
        options.set_clean_session(true);
        if let Some(creds) = &cfg.credentials {
            options.set_credentials(creds.username.clone(), creds.password.expose_secret());
        }
        if cfg.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    async fn client(&self) -> Result<AsyncClient, Error> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(s) if self.connected.load(Ordering::Acquire) => Ok(s.client.clone()),
            _ => Err(Error::BrokerConnect("no active broker session".into())),
        }
    }
}

impl BrokerTransport for MqttTransport {
    async fn connect(&self) -> Result<(), Error> {
        self.config.validate()?;
        let mut session = self.session.lock().await;
        if session.is_some() && self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(stale) = session.take() {
            stale.cancel.cancel();
            let _ = stale.driver.await;
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.tls,
            "connecting to broker"
        );

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, await_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::BrokerConnect(format!(
                    "no acknowledgement within {timeout:?}"
                )));
            }
        }

        self.connected.store(true, Ordering::Release);
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(
            eventloop,
            Arc::clone(&self.connected),
            self.inbound.clone(),
            cancel.clone(),
        ));
        *session = Some(MqttSession {
            client,
            cancel,
            driver,
        });

        tracing::info!("connected to broker");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Error> {
        let client = self.client().await?;
        client.subscribe(topic, qos).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> Result<(), Error> {
        let client = self.client().await?;
        client.publish_bytes(topic, qos, retain, payload).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        if self.connected.load(Ordering::Acquire) {
            if let Err(e) = session.client.disconnect().await {
                tracing::debug!(error = %e, "disconnect request not queued");
            }
        }

        let mut driver = session.driver;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut driver).await.is_err() {
            session.cancel.cancel();
            let _ = driver.await;
        }
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            session.driver.abort();
        }
    }
}

/// Poll until the broker answers the CONNECT.
async fn await_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(Error::BrokerConnect(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(Error::BrokerConnect(e.to_string())),
        }
    }
}

/// Keep the session moving until it closes, from either side.
async fn drive(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    inbound: broadcast::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    let cause = loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break "local shutdown".to_owned(),
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(topic = %publish.topic, bytes = publish.payload.len(), "publication");
                // No receivers is fine; publications are fire-and-forget.
                let _ = inbound.send(InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                });
            }
            Ok(Event::Incoming(Packet::Disconnect)) => break "broker sent DISCONNECT".to_owned(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break "client disconnected".to_owned(),
            Ok(_) => {}
            Err(e) => break e.to_string(),
        }
    };

    connected.store(false, Ordering::Release);
    tracing::info!(cause = %cause, "broker session closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BrokerCredentials;

    #[test]
    fn options_reflect_config() {
        let mut cfg = BrokerConfig::new("broker.local", 8883);
        cfg.client_id = "mango-1".into();
        cfg.keep_alive = Duration::from_secs(15);
        cfg.credentials = Some(BrokerCredentials {
            username: "mango".into(),
            password: "hunter2".into(),
        });
        let transport = MqttTransport::new(cfg);
        let options = transport.options();

        assert_eq!(options.client_id(), "mango-1");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 8883));
        assert_eq!(options.keep_alive(), Duration::from_secs(15));
        assert_eq!(
            options.credentials(),
            Some(("mango".to_string(), "hunter2".to_string()))
        );
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let transport = MqttTransport::new(BrokerConfig::new("127.0.0.1", 1));
        transport.disconnect().await;
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn requests_without_session_fail() {
        let transport = MqttTransport::new(BrokerConfig::new("127.0.0.1", 1));
        assert!(matches!(
            transport.subscribe("creatures/#", QoS::AtMostOnce).await,
            Err(Error::BrokerConnect(_))
        ));
    }

    #[tokio::test]
    async fn sub_second_keep_alive_is_rejected() {
        let mut cfg = BrokerConfig::new("127.0.0.1", 1);
        cfg.keep_alive = Duration::from_millis(500);
        let transport = MqttTransport::new(cfg);

        assert!(matches!(
            transport.connect().await,
            Err(Error::InvalidConfig { field: "keep_alive", .. })
        ));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn refused_connect_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = BrokerConfig::new("127.0.0.1", port);
        cfg.connect_timeout = Duration::from_secs(2);
        let transport = MqttTransport::new(cfg);

        assert!(matches!(transport.connect().await, Err(Error::BrokerConnect(_))));
        assert!(!transport.is_connected());
    }
}
