//! Configuration for creature-net tools.
//!
//! One TOML file (platform config dir or an explicit path), overridden by
//! `CREATURE_`-prefixed environment variables, translated into the runtime
//! types `creature_net` consumes. Nesting in variable names uses `__`:
//! `CREATURE_BROKER__HOST=broker.local`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use creature_net::{BackoffPolicy, BrokerConfig, BrokerCredentials, SacnConfig, ServerConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<creature_net::Error> for ConfigError {
    fn from(err: creature_net::Error) -> Self {
        match err {
            creature_net::Error::InvalidConfig { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            other => Self::Validation {
                field: "config".into(),
                reason: other.to_string(),
            },
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Control server (duplex WebSocket).
    #[serde(default)]
    pub server: ServerSection,

    /// Pub/sub broker.
    #[serde(default)]
    pub broker: BrokerSection,

    /// Lighting network.
    #[serde(default)]
    pub sacn: SacnSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Output format: "table" or "json".
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    /// WebSocket endpoint, `ws://` or `wss://`.
    #[serde(default = "default_server_url")]
    pub url: String,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            ping_interval_secs: default_ping_interval(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:8000/api/v1/websocket".into()
}
fn default_ping_interval() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerSection {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: bool,

    /// Client id; a random one is generated when unset.
    pub client_id: Option<String>,

    pub username: Option<String>,

    /// Password (never written back by `save_config` -- prefer `password_env`).
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub backoff: BackoffSection,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            tls: false,
            client_id: None,
            username: None,
            password: None,
            password_env: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            backoff: BackoffSection::default(),
        }
    }
}

fn default_broker_host() -> String {
    "localhost".into()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_keep_alive() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffSection {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            max_failures: default_max_failures(),
        }
    }
}

fn default_initial_delay() -> f64 {
    BackoffPolicy::default().initial_delay().as_secs_f64()
}
fn default_max_delay() -> f64 {
    BackoffPolicy::default().max_delay().as_secs_f64()
}
fn default_max_failures() -> u32 {
    BackoffPolicy::default().max_failures()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SacnSection {
    #[serde(default = "default_universe")]
    pub universe: u16,

    /// Interface to join on; the OS picks when unset.
    pub interface: Option<String>,
}

impl Default for SacnSection {
    fn default() -> Self {
        Self {
            universe: default_universe(),
            interface: None,
        }
    }
}

fn default_universe() -> u16 {
    1
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    /// Validate the `[server]` section and build a [`ServerConfig`].
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let section = &self.server;
        let url: url::Url = section
            .url
            .parse()
            .map_err(|_| invalid("server.url", format!("invalid URL: {}", section.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(
                "server.url",
                format!("expected a ws:// or wss:// URL, got '{}'", url.scheme()),
            ));
        }
        if section.ping_interval_secs == 0 {
            return Err(invalid("server.ping_interval_secs", "must be at least 1"));
        }

        let mut config = ServerConfig::new(url);
        config.ping_interval = Duration::from_secs(section.ping_interval_secs);
        config.connect_timeout = Duration::from_secs(section.connect_timeout_secs.max(1));
        Ok(config)
    }

    /// Validate the `[broker]` section and build a [`BrokerConfig`].
    pub fn broker_config(&self) -> Result<BrokerConfig, ConfigError> {
        let section = &self.broker;
        if section.host.trim().is_empty() {
            return Err(invalid("broker.host", "must not be empty"));
        }
        if section.keep_alive_secs == 0 {
            return Err(invalid("broker.keep_alive_secs", "must be at least 1"));
        }

        let backoff = BackoffPolicy::from_secs_f64(
            section.backoff.initial_delay_secs,
            section.backoff.max_delay_secs,
            section.backoff.max_failures,
        )?;

        let mut config = BrokerConfig::new(section.host.clone(), section.port);
        config.tls = section.tls;
        config.keep_alive = Duration::from_secs(section.keep_alive_secs);
        config.connect_timeout = Duration::from_secs(section.connect_timeout_secs.max(1));
        config.backoff = backoff;
        if let Some(id) = &section.client_id {
            config.client_id.clone_from(id);
        }
        config.credentials = resolve_broker_credentials(section)?;
        Ok(config)
    }

    /// Validate the `[sacn]` section and build a [`SacnConfig`].
    pub fn sacn_config(&self) -> Result<SacnConfig, ConfigError> {
        Ok(SacnConfig::new(
            self.sacn.universe,
            self.sacn.interface.clone(),
        )?)
    }
}

/// Resolve broker credentials: `password_env` first, then the plaintext
/// `password`. A username without any password is an error.
fn resolve_broker_credentials(
    section: &BrokerSection,
) -> Result<Option<BrokerCredentials>, ConfigError> {
    let Some(username) = &section.username else {
        return Ok(None);
    };

    let from_env = section
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .map(SecretString::from);

    let password = from_env
        .or_else(|| section.password.clone())
        .ok_or_else(|| {
            invalid(
                "broker.password",
                format!("username '{username}' is set but no password is configured"),
            )
        })?;

    Ok(Some(BrokerCredentials {
        username: username.clone(),
        password,
    }))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "creature", "creature").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("creature");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CREATURE_").split("__"))
}

/// Load the full Config from file + environment.
///
/// `path` overrides the platform config location. A missing file is not
/// an error; defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// Load config, returning defaults if it cannot be read.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path` (or the canonical path).
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(path)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(cfg.defaults.output, "table");
        assert_eq!(cfg.sacn.universe, 1);
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.broker_config().unwrap().backoff, BackoffPolicy::default());
    }

    #[test]
    fn file_values_are_translated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
            [server]
            url = "wss://control.local/api/v1/websocket"
            ping_interval_secs = 5

            [broker]
            host = "broker.local"
            port = 8883
            tls = true
            client_id = "workshop"
            username = "beaky"
            password = "squawk"
            keep_alive_secs = 15

            [broker.backoff]
            initial_delay_secs = 0.5
            max_delay_secs = 8.0
            max_failures = 4

            [sacn]
            universe = 42
            interface = "eth0"
            "#,
        );
        let cfg = load_config(Some(&path)).unwrap();

        let server = cfg.server_config().unwrap();
        assert_eq!(server.url.as_str(), "wss://control.local/api/v1/websocket");
        assert_eq!(server.ping_interval, Duration::from_secs(5));

        let broker = cfg.broker_config().unwrap();
        assert_eq!(broker.host, "broker.local");
        assert!(broker.tls);
        assert_eq!(broker.client_id, "workshop");
        assert_eq!(broker.keep_alive, Duration::from_secs(15));
        assert_eq!(broker.backoff.max_delay(), Duration::from_secs(8));
        let creds = broker.credentials.unwrap();
        assert_eq!(creds.username, "beaky");
        assert_eq!(creds.password.expose_secret(), "squawk");

        let sacn = cfg.sacn_config().unwrap();
        assert_eq!(sacn, SacnConfig::new(42, Some("eth0".into())).unwrap());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.server.url = "http://control.local/".into();
        assert!(matches!(
            cfg.server_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "server.url"
        ));

        cfg.broker.keep_alive_secs = 0;
        assert!(cfg.broker_config().is_err());

        cfg.broker.keep_alive_secs = 30;
        cfg.broker.backoff.initial_delay_secs = 0.01;
        assert!(matches!(
            cfg.broker_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "initial_delay"
        ));

        cfg.sacn.universe = 64000;
        assert!(cfg.sacn_config().is_err());
    }

    #[test]
    fn username_requires_password() {
        let mut cfg = Config::default();
        cfg.broker.username = Some("beaky".into());
        assert!(cfg.broker_config().is_err());

        cfg.broker.password = Some(SecretString::from("squawk"));
        assert!(cfg.broker_config().unwrap().credentials.is_some());
    }

    #[test]
    fn save_round_trips_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.sacn.universe = 7;
        cfg.broker.username = Some("beaky".into());
        cfg.broker.password = Some(SecretString::from("squawk"));

        let written = save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(written, path);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("squawk"));

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.sacn.universe, 7);
        assert_eq!(loaded.broker.username.as_deref(), Some("beaky"));
        assert!(loaded.broker.password.is_none());
    }
}
