//! Output formatting: tables for people, JSON for scripts.
//!
//! Table output uses `tabled`; JSON goes through serde. Streaming commands
//! print one line per event so their output can be piped.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use creature_config::Config;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// The effective output format: flag, then config default, then table.
pub fn format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| match cfg.defaults.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    })
}

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Applies colors only when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            enabled: should_color(mode),
        }
    }

    pub fn good(self, text: &str) -> String {
        if self.enabled { text.green().to_string() } else { text.to_owned() }
    }

    pub fn bad(self, text: &str) -> String {
        if self.enabled { text.red().to_string() } else { text.to_owned() }
    }

    pub fn warn(self, text: &str) -> String {
        if self.enabled { text.yellow().to_string() } else { text.to_owned() }
    }

    pub fn accent(self, text: &str) -> String {
        if self.enabled { text.cyan().to_string() } else { text.to_owned() }
    }

    pub fn dim(self, text: &str) -> String {
        if self.enabled { text.dimmed().to_string() } else { text.to_owned() }
    }

    /// Color a log level by severity.
    pub fn level(self, level: &str) -> String {
        let label = format!("{:<5}", level.to_uppercase());
        match level.to_ascii_lowercase().as_str() {
            "error" | "critical" | "fatal" => self.bad(&label),
            "warn" | "warning" => self.warn(&label),
            "debug" | "trace" => self.dim(&label),
            _ => self.good(&label),
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
    }
}

/// Render one streamed event: `line_fn` for people, compact JSON for scripts.
pub fn render_event<T>(
    format: OutputFormat,
    data: &T,
    line_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(line_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Render the leading slots of a frame as zero-padded decimal.
pub fn slot_preview(slots: &[u8]) -> String {
    slots
        .iter()
        .map(|v| format!("{v:03}"))
        .collect::<Vec<_>>()
        .join(" ")
}
