//! Stats command handler

use sanar::SuggestionStore;

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::render_statistics;
use crate::StatsArgs;

/// Summarize the suggestion log
pub fn execute_stats(config: &CliConfig, args: &StatsArgs) -> CliResult<()> {
    let stats = SuggestionStore::new(&args.store).statistics();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else if !config.verbosity.is_quiet() {
        print!("{}", render_statistics(&stats));
    }
    Ok(())
}
