//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use creature_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {target}")]
    #[diagnostic(
        code(creature::connection_failed),
        help(
            "Check that the service is running and reachable.\n\
             Target: {target}\n\
             Try: creature config show"
        )
    )]
    ConnectionFailed {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Connection to {target} was lost")]
    #[diagnostic(
        code(creature::connection_lost),
        help("Run without --no-reconnect to keep retrying.")
    )]
    ConnectionLost { target: String },

    // ── Network ──────────────────────────────────────────────────────

    #[error("Could not join the sACN universe")]
    #[diagnostic(
        code(creature::multicast),
        help(
            "Another process may hold the port without address reuse, or the\n\
             interface may not support multicast. Try: creature interfaces"
        )
    )]
    Multicast {
        #[source]
        source: creature_net::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(creature::network))]
    Network(creature_net::Error),

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(creature::not_found),
        help("Run: creature {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(creature::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(creature::config),
        help("Check the config file (creature config path) and CREATURE_* variables.")
    )]
    Config(Box<ConfigError>),

    // ── Serialization ─────────────────────────────────────────────────

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(creature::json))]
    Json(#[from] serde_json::Error),

    #[error("TOML encoding failed: {0}")]
    #[diagnostic(code(creature::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error → CliError mapping ─────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<creature_net::Error> for CliError {
    fn from(err: creature_net::Error) -> Self {
        use creature_net::Error as NetError;

        match err {
            NetError::InterfaceNotFound(name) => Self::NotFound {
                resource_type: "interface".into(),
                identifier: name,
                list_command: "interfaces".into(),
            },
            NetError::InvalidConfig { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            err @ NetError::MulticastJoin { .. } => Self::Multicast { source: err },
            NetError::WebSocketConnect(reason) => Self::ConnectionFailed {
                target: "control server".into(),
                source: reason.into(),
            },
            NetError::BrokerConnect(reason) => Self::ConnectionFailed {
                target: "broker".into(),
                source: reason.into(),
            },
            other => Self::Network(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_map_to_exit_codes() {
        let err = CliError::from(creature_net::Error::InterfaceNotFound("eth9".into()));
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);

        let err = CliError::from(creature_net::Error::BrokerConnect("refused".into()));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);

        let err = CliError::from(ConfigError::Validation {
            field: "sacn.universe".into(),
            reason: "zero".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);

        let err = CliError::from(creature_net::Error::NotConnected);
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
