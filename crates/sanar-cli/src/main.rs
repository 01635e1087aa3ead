//! Sanar CLI: review and apply healed locators
//!
//! ## Usage
//!
//! ```bash
//! sanar suggestions -n 5                       # Newest suggestions
//! sanar stats                                  # Totals per strategy
//! sanar apply --file login.spec.ts --line 12 --suggestion 1a2b3c4d
//! sanar backups list login.spec.ts             # Backups, newest first
//! sanar config check healing.yaml              # Validate a config file
//! ```

use clap::Parser;
use sanar_cli::{
    handlers::{execute_apply, execute_backups, execute_config, execute_stats, execute_suggestions},
    init_tracing, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    console::set_colors_enabled(config.color.should_color());
    init_tracing(config.verbosity);
    tracing::debug!(command = ?cli.command, "dispatching");

    match &cli.command {
        Commands::Suggestions(args) => execute_suggestions(&config, args),
        Commands::Stats(args) => execute_stats(&config, args),
        Commands::Apply(args) => execute_apply(&config, args),
        Commands::Backups(args) => execute_backups(&config, args),
        Commands::Config(args) => execute_config(&config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(ColorChoice::from(cli.color.clone()))
}
