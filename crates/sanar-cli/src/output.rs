//! Text rendering for suggestions, statistics and backups

use console::style;
use sanar::{BackupInfo, HealingConfig, SuggestionRecord, SuggestionStatistics};
use std::fmt::Write;

/// Short form of a record id
#[must_use]
pub fn short_id(record: &SuggestionRecord) -> String {
    record.id.to_string().chars().take(8).collect()
}

fn status(record: &SuggestionRecord) -> String {
    if record.applied {
        style("applied").green().to_string()
    } else if record.healed_locator.is_some() {
        style("suggested").yellow().to_string()
    } else {
        style("unhealed").red().to_string()
    }
}

/// One block per record
#[must_use]
pub fn render_suggestions(records: &[SuggestionRecord], total: usize) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No healing suggestions recorded\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{} ({} of {total})",
        style("Healing suggestions").bold(),
        records.len()
    );
    for record in records {
        let healed = record.healed_locator.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "  {}  {}  {}",
            style(short_id(record)).cyan(),
            record.timestamp,
            status(record)
        );
        let _ = write!(out, "      {} -> {}", record.original_locator, style(healed).bold());
        if let (Some(score), Some(strategy)) = (record.score, record.strategy) {
            let _ = write!(out, "  ({score:.1}, {strategy})");
        }
        out.push('\n');
        if let Some(test) = &record.test_name {
            let _ = writeln!(out, "      test: {test}");
        }
        if let (Some(file), Some(line)) = (&record.file_path, record.line_number) {
            let _ = writeln!(out, "      at {}:{line}", file.display());
        }
        if let Some(reason) = record.reason {
            let _ = writeln!(out, "      reason: {reason}");
        }
    }
    out
}

/// Aggregate counts as aligned text
#[must_use]
pub fn render_statistics(stats: &SuggestionStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Suggestion log").bold());
    let _ = writeln!(out, "  Total:      {}", stats.total);
    let _ = writeln!(out, "  Successful: {}", stats.successful);
    let _ = writeln!(out, "  Applied:    {}", stats.applied);
    match stats.average_score {
        Some(avg) => {
            let _ = writeln!(out, "  Avg score:  {avg:.1}");
        }
        None => out.push_str("  Avg score:  -\n"),
    }
    if !stats.by_strategy.is_empty() {
        out.push_str("  By strategy:\n");
        for (strategy, count) in &stats.by_strategy {
            let _ = writeln!(out, "    {:<11} {count}", strategy.as_str());
        }
    }
    out
}

/// Backup listing, newest first
#[must_use]
pub fn render_backups(backups: &[BackupInfo]) -> String {
    if backups.is_empty() {
        return "No backups found\n".to_string();
    }
    let mut out = String::new();
    for backup in backups {
        let _ = writeln!(
            out,
            "  {}  {:>8} B  {}",
            style(&backup.stamp).cyan(),
            backup.size,
            backup.path.display()
        );
    }
    out
}

/// Summary of a validated configuration
#[must_use]
pub fn render_config(config: &HealingConfig) -> String {
    let strategies: Vec<&str> = config.strategies.iter().map(|s| s.as_str()).collect();
    let mut out = String::new();
    let _ = writeln!(out, "  enabled:    {}", config.enabled);
    let _ = writeln!(out, "  mode:       {}", config.mode);
    let _ = writeln!(out, "  threshold:  {}", config.auto_apply_threshold);
    let _ = writeln!(out, "  strategies: {}", strategies.join(", "));
    let _ = writeln!(out, "  storage:    {}", config.storage_path.display());
    let _ = writeln!(out, "  exclusions: {}", config.exclude_tests.len());
    out
}
