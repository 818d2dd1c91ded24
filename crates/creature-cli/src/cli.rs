//! Clap derive structures for the `creature` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// creature -- inspect and drive the creature control network
#[derive(Debug, Parser)]
#[command(
    name = "creature",
    version,
    about = "Inspect and drive the creature control network",
    long_about = "Inspect and drive the creature control network.\n\n\
        Listen to sACN lighting universes, monitor the control server's\n\
        telemetry channel, and publish or subscribe on the message broker.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "CREATURE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to the config file's `defaults.output`)
    #[arg(long, short = 'o', env = "CREATURE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable (default)
    Table,
    /// JSON; streaming commands emit one object per line
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List network interfaces and their IPv4 addresses
    #[command(alias = "if")]
    Interfaces,

    /// Print sACN frames received on a universe
    Listen(ListenArgs),

    /// Follow the control server's notices, logs, and counters
    #[command(alias = "mon")]
    Monitor(MonitorArgs),

    /// Publish one message to the broker
    #[command(alias = "pub")]
    Publish(PublishArgs),

    /// Print messages the broker delivers for a topic
    #[command(alias = "sub")]
    Subscribe(SubscribeArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Listen ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Universe to join (1-63999; defaults to `sacn.universe`)
    #[arg(long, short = 'u', value_parser = clap::value_parser!(u16).range(1..=63999))]
    pub universe: Option<u16>,

    /// Interface to join on (defaults to `sacn.interface`, then the OS choice)
    #[arg(long, short = 'i')]
    pub interface: Option<String>,

    /// Exit after this many frames
    #[arg(long, short = 'n')]
    pub count: Option<u64>,

    /// Number of leading slots to print per frame
    #[arg(long, default_value = "16", value_parser = clap::value_parser!(u16).range(1..=512))]
    pub slots: u16,
}

// ── Monitor ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Control server WebSocket URL (overrides `server.url`)
    #[arg(long)]
    pub url: Option<String>,

    /// Exit when the connection drops instead of reconnecting
    #[arg(long)]
    pub no_reconnect: bool,

    /// Hide server log lines
    #[arg(long)]
    pub no_logs: bool,

    /// Hide server counter snapshots
    #[arg(long)]
    pub no_counters: bool,
}

// ── Broker ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Topic to publish to
    #[arg(long, short = 't')]
    pub topic: String,

    /// Message body
    #[arg(long, short = 'm')]
    pub message: String,

    /// Delivery guarantee (0, 1 or 2)
    #[arg(long, default_value = "0", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: u8,

    /// Ask the broker to retain the message
    #[arg(long)]
    pub retain: bool,
}

#[derive(Debug, Args)]
pub struct SubscribeArgs {
    /// Topic filter (`+` and `#` wildcards allowed)
    #[arg(long, short = 't')]
    pub topic: String,

    /// Delivery guarantee (0, 1 or 2)
    #[arg(long, default_value = "0", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: u8,

    /// Exit after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (file + environment)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
