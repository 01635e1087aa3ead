//! Suggestions command handler

use sanar::SuggestionStore;

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::render_suggestions;
use crate::SuggestionsArgs;

/// List the newest suggestions
pub fn execute_suggestions(config: &CliConfig, args: &SuggestionsArgs) -> CliResult<()> {
    let store = SuggestionStore::new(&args.store);
    let recent = store.recent(args.limit);
    tracing::debug!(store = %args.store.display(), shown = recent.len(), "loaded suggestions");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recent)?);
    } else if !config.verbosity.is_quiet() {
        let total = store.load_suggestions().len();
        print!("{}", render_suggestions(&recent, total));
    }
    Ok(())
}
