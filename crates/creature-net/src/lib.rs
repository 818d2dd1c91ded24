// creature-net: Transport and protocol layer for animatronic creature control (sACN, control server, broker).

pub mod config;
pub mod duplex;
pub mod error;
pub mod interfaces;
pub mod message;
pub mod multicast;
pub mod pubsub;
pub mod queue;
pub mod sacn;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{BackoffPolicy, BrokerConfig, BrokerCredentials, SacnConfig, ServerConfig};
pub use duplex::{ConnectionState, DuplexClient, StateSubscription, TelemetryQueues};
pub use error::Error;
pub use interfaces::{InterfaceCatalog, InterfaceKind, NetworkInterfaceDescriptor, SystemInterfaces};
pub use message::{Message, MessageKind, MessageProcessor};
pub use multicast::{MulticastReceiver, ReceiverState, ReceiverStats};
pub use pubsub::{
    BackoffState, BrokerTransport, InboundMessage, MqttTransport, Outcome, PubSubConnector, QoS,
};
pub use queue::AsyncBlockingQueue;
pub use sacn::Frame;
