//! Apply command handler

use console::style;
use sanar::{CodeModificationRequest, CodeModifier, SuggestionStore};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::ApplyArgs;

/// Turn the arguments into a modification request
pub fn build_request(args: &ApplyArgs) -> CliResult<CodeModificationRequest> {
    if args.line == 0 {
        return Err(CliError::invalid_argument("--line is 1-based"));
    }

    let (original, healed) = match (&args.suggestion, &args.original, &args.healed) {
        (Some(id), _, _) => {
            let record = SuggestionStore::new(&args.store)
                .find(id)
                .ok_or_else(|| CliError::SuggestionNotFound { id: id.clone() })?;
            let healed = record.healed_locator.ok_or_else(|| {
                CliError::invalid_argument(format!("suggestion {id} has no healed locator"))
            })?;
            (record.original_locator, healed)
        }
        (None, Some(original), Some(healed)) => (original.clone(), healed.clone()),
        _ => {
            return Err(CliError::invalid_argument(
                "either --suggestion or both --original and --healed are required",
            ))
        }
    };

    let request = CodeModificationRequest::new(&args.file, args.line, original, healed);
    Ok(if args.no_backup {
        request.without_backup()
    } else {
        request
    })
}

/// Rewrite the locator in the source file
pub fn execute_apply(config: &CliConfig, args: &ApplyArgs) -> CliResult<()> {
    let request = build_request(args)?;
    let result = CodeModifier::new().apply_healing_to_code(&request);
    if !result.success {
        return Err(CliError::apply(
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    if !config.verbosity.is_quiet() {
        println!(
            "{} {}:{}  {} -> {}",
            style("✓").green(),
            result.file_path.display(),
            result.modified_line.unwrap_or(request.line_number),
            request.original,
            request.replacement
        );
        if let Some(backup) = &result.backup_path {
            println!("  backup: {}", backup.display());
        }
    }
    Ok(())
}
