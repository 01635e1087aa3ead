//! Command handlers, one module per subcommand

pub mod apply;
pub mod backups;
pub mod config;
pub mod stats;
pub mod suggestions;

pub use apply::{build_request, execute_apply};
pub use backups::execute_backups;
pub use config::execute_config;
pub use stats::execute_stats;
pub use suggestions::execute_suggestions;
