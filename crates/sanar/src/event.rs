//! `locator-healed` event records for trace and report viewers.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::config::{HealingMode, StrategyKind};
use crate::context::{HealingContext, HealingResult, ScoredCandidate};
use crate::result::HealResult;

/// Emitted once per validated healing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "locator-healed", rename_all = "camelCase")]
pub struct LocatorHealedEvent {
    /// Locator that failed
    pub original_locator: String,
    /// Locator that worked
    pub healed_locator: String,
    /// Score of the healed locator
    pub score: f64,
    /// Strategy that produced it
    pub strategy: StrategyKind,
    /// Applied for this run
    pub applied: bool,
    /// Applied by auto mode
    pub auto_applied: bool,
    /// Test identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    /// 1-based source line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl LocatorHealedEvent {
    /// Build the event for a validated candidate
    #[must_use]
    pub fn new(
        ctx: &HealingContext,
        result: &HealingResult,
        healed: &ScoredCandidate,
        mode: HealingMode,
    ) -> Self {
        Self {
            original_locator: ctx.original.to_string(),
            healed_locator: healed.candidate.locator.to_string(),
            score: healed.score,
            strategy: healed.candidate.strategy,
            applied: result.applied || result.applied_locator.is_some(),
            auto_applied: mode == HealingMode::Auto && result.applied,
            test_name: ctx.test_name.clone(),
            line_number: ctx.line_number,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Receives healing events
pub trait EventSink: Send + Sync {
    /// Record one event
    fn emit(&self, event: &LocatorHealedEvent);
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LocatorHealedEvent>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<LocatorHealedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LocatorHealedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Create a sink writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Target file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &LocatorHealedEvent) -> HealResult<()> {
        let line = serde_json::to_string(event)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every event back
    pub fn read_all(&self) -> HealResult<Vec<LocatorHealedEvent>> {
        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &LocatorHealedEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write healing event");
        }
    }
}
