use thiserror::Error;

/// Top-level error type for the `creature-net` crate.
///
/// Covers every failure mode the transport layer surfaces to callers:
/// multicast sockets, the control-server connection, message encoding,
/// the pub/sub broker, and runtime configuration. Malformed sACN datagrams
/// and undecodable envelopes are deliberately absent -- those are dropped,
/// never returned.
#[derive(Debug, Error)]
pub enum Error {
    // ── Sockets ─────────────────────────────────────────────────────
    /// Socket creation, bind, or receive failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Joining the multicast group for a universe failed.
    #[error("Failed to join multicast group {group} on {interface}: {source}")]
    MulticastJoin {
        group: std::net::Ipv4Addr,
        interface: std::net::Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    /// The requested network interface does not exist or has no IPv4 address.
    #[error("Network interface '{0}' not found or has no IPv4 address")]
    InterfaceNotFound(String),

    // ── Control server ──────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// An operation needed a live connection and there was none.
    #[error("Not connected to the control server")]
    NotConnected,

    /// Transmitting an outbound message failed.
    #[error("Failed to send message: {0}")]
    Send(String),

    // ── Messages ────────────────────────────────────────────────────
    /// JSON (de)serialization of an envelope or payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The envelope carried a command tag outside the known set.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    // ── Broker ──────────────────────────────────────────────────────
    /// Could not establish a session with the pub/sub broker.
    #[error("Broker connection failed: {0}")]
    BrokerConnect(String),

    /// A subscribe or publish request was rejected by the client.
    #[error("Broker request failed: {0}")]
    BrokerRequest(#[from] rumqttc::ClientError),

    // ── Configuration ───────────────────────────────────────────────
    /// A runtime configuration value is out of range.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
            ),
            Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::NotConnected
            | Self::BrokerConnect(_)
            | Self::BrokerRequest(_) => true,
            _ => false,
        }
    }

    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
