//! Config subcommand handlers.

use creature_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let rendered = match output::format(global, cfg) {
                OutputFormat::Table => toml::to_string_pretty(cfg)?,
                OutputFormat::Json => serde_json::to_string_pretty(cfg)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
        }
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(creature_config::config_path);
            output::print_output(&path.display().to_string(), global.quiet);
        }
    }
    Ok(())
}
