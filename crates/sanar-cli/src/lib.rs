//! Sanar CLI Library
//!
//! Command-line review of the healing suggestion log: list and summarize
//! suggestions, apply a healed locator to a test file, manage the backups
//! written while doing so, and validate healing configuration files.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    ApplyArgs, BackupsArgs, BackupsCommand, Cli, ColorArg, Commands, ConfigArgs, ConfigCommand,
    StatsArgs, SuggestionsArgs,
};
pub use config::{init_tracing, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_backups, render_config, render_statistics, render_suggestions, short_id};
