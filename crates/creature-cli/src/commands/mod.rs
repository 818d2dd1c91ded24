//! Command dispatch: bridges CLI args -> creature-net -> output formatting.

pub mod config_cmd;
pub mod interfaces;
pub mod listen;
pub mod monitor;
pub mod publish;
pub mod subscribe;

use creature_config::Config;
use creature_net::QoS;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a configured command to its handler.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Interfaces => interfaces::handle(cfg, global),
        Command::Listen(args) => listen::handle(args, cfg, global).await,
        Command::Monitor(args) => monitor::handle(args, cfg, global).await,
        Command::Publish(args) => publish::handle(args, cfg, global).await,
        Command::Subscribe(args) => subscribe::handle(args, cfg, global).await,
        Command::Config(args) => config_cmd::handle(args, cfg, global),
        // Handled before configuration is loaded
        Command::Completions(_) => Ok(()),
    }
}

/// Map a `--qos` level onto the broker's delivery guarantee.
fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Resolves when the user presses Ctrl-C. Never resolves if the handler
/// cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
