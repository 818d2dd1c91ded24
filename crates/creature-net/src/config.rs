// ── Runtime connection configuration ──
//
// These types describe *how* to reach the control server, the broker, and
// the lighting network. They carry credentials and tuning but never touch
// disk -- `creature-config` builds them from files and environment.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::sacn;

/// Control-server (duplex WebSocket) settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. `ws://10.3.2.11:8000/api/v1/websocket`.
    pub url: Url,
    /// How often to ping the server while connected.
    pub ping_interval: Duration,
    /// Give up on the opening handshake after this long.
    pub connect_timeout: Duration,
}

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

impl ServerConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ping_interval: DEFAULT_PING_INTERVAL,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.ping_interval.is_zero() {
            return Err(Error::invalid_config("ping_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Username/password pair for the broker.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Pub/sub broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub credentials: Option<BrokerCredentials>,
    pub client_id: String,
    pub keep_alive: Duration,
    pub backoff: BackoffPolicy,
    /// How long to wait for the broker to acknowledge a connect.
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    /// Plain-TCP settings with a random client id and default backoff.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            credentials: None,
            client_id: format!("creature-net-{}", uuid::Uuid::new_v4().simple()),
            keep_alive: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Reject settings the broker session cannot run with. Keep-alive
    /// travels as whole seconds in a u16.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.is_empty() {
            return Err(Error::invalid_config("host", "must not be empty"));
        }
        if self.keep_alive < MIN_KEEP_ALIVE || self.keep_alive.as_secs() > u64::from(u16::MAX) {
            return Err(Error::invalid_config(
                "keep_alive",
                format!(
                    "must be between 1s and {}s, got {:?}",
                    u16::MAX,
                    self.keep_alive
                ),
            ));
        }
        Ok(())
    }
}

const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Exponential backoff applied after broker failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    max_failures: u32,
}

impl BackoffPolicy {
    pub const MIN_INITIAL_DELAY: Duration = Duration::from_millis(100);

    /// Validated constructor.
    ///
    /// Requires `initial_delay >= 100ms`, `max_delay >= initial_delay`,
    /// and `max_failures >= 1`.
    pub fn new(initial_delay: Duration, max_delay: Duration, max_failures: u32) -> Result<Self, Error> {
        if initial_delay < Self::MIN_INITIAL_DELAY {
            return Err(Error::invalid_config(
                "initial_delay",
                format!("must be at least {:?}, got {initial_delay:?}", Self::MIN_INITIAL_DELAY),
            ));
        }
        if max_delay < initial_delay {
            return Err(Error::invalid_config(
                "max_delay",
                format!("must be >= initial delay {initial_delay:?}, got {max_delay:?}"),
            ));
        }
        if max_failures == 0 {
            return Err(Error::invalid_config("max_failures", "must be at least 1"));
        }
        Ok(Self {
            initial_delay,
            max_delay,
            max_failures,
        })
    }

    /// Same as [`new`](Self::new), taking fractional seconds.
    pub fn from_secs_f64(initial: f64, max: f64, max_failures: u32) -> Result<Self, Error> {
        let to_duration = |field: &'static str, secs: f64| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::invalid_config(field, e.to_string()))
        };
        Self::new(
            to_duration("initial_delay", initial)?,
            to_duration("max_delay", max)?,
            max_failures,
        )
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Cool-down after `failures` consecutive failures.
    ///
    /// `min(initial * 2^(failures-1), max)`; zero failures means no delay.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_failures: 6,
        }
    }
}

/// Lighting-network settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SacnConfig {
    pub universe: u16,
    /// Interface name to join on; `None` lets the OS choose.
    pub interface: Option<String>,
}

impl SacnConfig {
    pub fn new(universe: u16, interface: Option<String>) -> Result<Self, Error> {
        if !sacn::is_valid_universe(universe) {
            return Err(Error::invalid_config(
                "universe",
                format!(
                    "must be between {} and {}, got {universe}",
                    sacn::UNIVERSE_MIN,
                    sacn::UNIVERSE_MAX
                ),
            ));
        }
        Ok(Self {
            universe,
            interface,
        })
    }
}
