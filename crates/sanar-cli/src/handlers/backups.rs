//! Backups command handler

use console::style;
use sanar::{cleanup_backups, list_backups, restore_backup};

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::render_backups;
use crate::{BackupsArgs, BackupsCommand};

/// List, restore or clean backups
pub fn execute_backups(config: &CliConfig, args: &BackupsArgs) -> CliResult<()> {
    let quiet = config.verbosity.is_quiet();
    match &args.command {
        BackupsCommand::List { file } => {
            let backups = list_backups(file)?;
            if !quiet {
                print!("{}", render_backups(&backups));
            }
        }
        BackupsCommand::Restore { backup, to } => {
            restore_backup(backup, to)?;
            if !quiet {
                println!(
                    "{} restored {} from {}",
                    style("✓").green(),
                    to.display(),
                    backup.display()
                );
            }
        }
        BackupsCommand::Clean { file, keep } => {
            let removed = cleanup_backups(file, *keep)?;
            if !quiet {
                println!("Removed {removed} backup(s) of {}, kept {keep}", file.display());
            }
        }
    }
    Ok(())
}
