//! Config command handler

use console::style;
use sanar::HealingConfig;

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::render_config;
use crate::{ConfigArgs, ConfigCommand};

/// Validate a configuration file or print the defaults
pub fn execute_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<()> {
    match &args.command {
        ConfigCommand::Check { path } => {
            let healing = HealingConfig::load(path)?;
            if !config.verbosity.is_quiet() {
                println!("{} {} is valid", style("✓").green(), path.display());
                print!("{}", render_config(&healing));
            }
        }
        ConfigCommand::Defaults => {
            println!("{}", serde_json::to_string_pretty(&HealingConfig::default())?);
        }
    }
    Ok(())
}
