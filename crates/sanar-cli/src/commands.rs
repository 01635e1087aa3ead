//! CLI command definitions using clap

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sanar: review and apply healed locators
#[derive(Parser, Debug)]
#[command(name = "sanar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List recorded healing suggestions
    Suggestions(SuggestionsArgs),

    /// Summarize the suggestion log
    Stats(StatsArgs),

    /// Apply a healed locator to a test source file
    Apply(ApplyArgs),

    /// Manage source backups
    Backups(BackupsArgs),

    /// Inspect healing configuration
    Config(ConfigArgs),
}

/// Arguments for the suggestions command
#[derive(Parser, Debug)]
pub struct SuggestionsArgs {
    /// Suggestion log
    #[arg(long, default_value = sanar::DEFAULT_STORAGE_PATH)]
    pub store: PathBuf,

    /// Number of suggestions to show, newest first
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Suggestion log
    #[arg(long, default_value = sanar::DEFAULT_STORAGE_PATH)]
    pub store: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the apply command
#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["suggestion", "original"])
))]
pub struct ApplyArgs {
    /// Test source file to modify
    #[arg(long)]
    pub file: PathBuf,

    /// 1-based line where the locator is used
    #[arg(long)]
    pub line: usize,

    /// Suggestion id (or unique prefix) to apply
    #[arg(long, conflicts_with_all = ["original", "healed"])]
    pub suggestion: Option<String>,

    /// Locator text to replace
    #[arg(long, requires = "healed")]
    pub original: Option<String>,

    /// Replacement locator text
    #[arg(long, requires = "original")]
    pub healed: Option<String>,

    /// Do not write a backup before modifying the file
    #[arg(long)]
    pub no_backup: bool,

    /// Suggestion log
    #[arg(long, default_value = sanar::DEFAULT_STORAGE_PATH)]
    pub store: PathBuf,
}

/// Arguments for the backups command
#[derive(Parser, Debug)]
pub struct BackupsArgs {
    /// Backup operation
    #[command(subcommand)]
    pub command: BackupsCommand,
}

/// Backup operations
#[derive(Subcommand, Debug)]
pub enum BackupsCommand {
    /// List backups of a file, newest first
    List {
        /// Source file
        file: PathBuf,
    },

    /// Restore a file from a backup
    Restore {
        /// Backup file
        backup: PathBuf,

        /// File to overwrite
        #[arg(long)]
        to: PathBuf,
    },

    /// Delete all but the newest backups of a file
    Clean {
        /// Source file
        file: PathBuf,

        /// Backups to keep
        #[arg(long, default_value = "5")]
        keep: usize,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config operation
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config operations
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate a JSON or YAML healing configuration
    Check {
        /// Configuration file
        path: PathBuf,
    },

    /// Print the default configuration as JSON
    Defaults,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
