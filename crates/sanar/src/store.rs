//! Suggestion store: the persisted log of healing attempts.
//!
//! A pretty-printed JSON array, oldest first. A missing or unreadable file
//! reads as empty. The retention cap is enforced on every write.
//!
//! Writes to one path are serialized within the process and land through a
//! temporary file renamed over the log, so readers never see a partial
//! file. A log that cannot be parsed is set aside as `<name>.corrupt`
//! before the first new write.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::config::{HealingConfig, HealingMode, StrategyKind, DEFAULT_MAX_SUGGESTIONS};
use crate::context::{FailureReason, HealingContext, HealingResult};
use crate::result::{HealError, HealResult};

/// Candidates kept per record
pub const MAX_RECORD_CANDIDATES: usize = 5;

/// Summary of one candidate inside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    /// Proposed locator
    pub locator: String,
    /// Producing strategy
    pub strategy: StrategyKind,
    /// Score in [0, 100]
    pub score: f64,
    /// Why it was proposed
    pub rationale: String,
}

/// One persisted healing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRecord {
    /// Record identifier
    pub id: Uuid,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Test identifier
    pub test_name: Option<String>,
    /// Source file
    pub file_path: Option<PathBuf>,
    /// 1-based source line
    pub line_number: Option<usize>,
    /// Locator that failed
    pub original_locator: String,
    /// Best replacement, if any
    pub healed_locator: Option<String>,
    /// Score of the best replacement
    pub score: Option<f64>,
    /// Strategy of the best replacement
    pub strategy: Option<StrategyKind>,
    /// A locator was usable for the run
    pub success: bool,
    /// The locator was auto-applied
    pub applied: bool,
    /// Failure reason
    pub reason: Option<FailureReason>,
    /// Mode the attempt ran under
    pub mode: HealingMode,
    /// Best candidates, highest score first
    pub candidates: Vec<CandidateSummary>,
}

impl SuggestionRecord {
    /// Build a record from an attempt
    #[must_use]
    pub fn from_result(ctx: &HealingContext, result: &HealingResult, mode: HealingMode) -> Self {
        let healed_locator = result
            .applied_locator
            .as_ref()
            .or_else(|| result.top().map(|t| &t.candidate.locator))
            .map(ToString::to_string);
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: ctx.test_name.clone(),
            file_path: ctx.file_path.clone(),
            line_number: ctx.line_number,
            original_locator: ctx.original.to_string(),
            healed_locator,
            score: result.score,
            strategy: result.strategy,
            success: result.success,
            applied: result.applied,
            reason: result.reason,
            mode,
            candidates: result
                .candidates
                .iter()
                .take(MAX_RECORD_CANDIDATES)
                .map(|c| CandidateSummary {
                    locator: c.candidate.locator.to_string(),
                    strategy: c.candidate.strategy,
                    score: c.score,
                    rationale: c.candidate.rationale.clone(),
                })
                .collect(),
        }
    }
}

/// Aggregate view of the log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionStatistics {
    /// Records in the log
    pub total: usize,
    /// Records with `success`
    pub successful: usize,
    /// Records with `applied`
    pub applied: usize,
    /// Mean score over successful records
    pub average_score: Option<f64>,
    /// Records per winning strategy
    pub by_strategy: BTreeMap<StrategyKind, usize>,
}

/// One write lock per log path, shared by every store in the process
fn write_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    let mut locks = LOCKS
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

/// File-backed suggestion log
#[derive(Debug, Clone)]
pub struct SuggestionStore {
    path: PathBuf,
    max_suggestions: usize,
}

impl SuggestionStore {
    /// Create a store at `path` with the default cap
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    /// Create the store a configuration points at
    #[must_use]
    pub fn from_config(config: &HealingConfig) -> Self {
        Self::new(config.storage_path.clone()).with_max_suggestions(config.max_suggestions)
    }

    /// Set the retention cap (minimum 1)
    #[must_use]
    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max.max(1);
        self
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record, dropping the oldest beyond the cap
    pub fn store_suggestion(&self, record: SuggestionRecord) -> HealResult<()> {
        let lock = write_lock(&self.path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = match self.read() {
            Ok(records) => records,
            Err(e) => {
                self.set_aside_corrupt(&e);
                Vec::new()
            }
        };
        records.push(record);
        if records.len() > self.max_suggestions {
            let excess = records.len() - self.max_suggestions;
            records.drain(..excess);
        }
        self.write(&records)
    }

    fn write(&self, records: &[SuggestionRecord]) -> HealResult<()> {
        let store_err = |what: &str, e: &dyn std::fmt::Display| HealError::Store {
            message: format!("cannot {what} {}: {e}", self.path.display()),
        };
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| store_err("create parent of", &e))?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };
        let json = serde_json::to_string_pretty(records)?;
        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| store_err("stage", &e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| store_err("write", &e))?;
        tmp.as_file().sync_all().map_err(|e| store_err("write", &e))?;
        tmp.persist(&self.path)
            .map_err(|e| store_err("replace", &e.error))?;
        Ok(())
    }

    /// Records on disk; a missing file is empty, an unparseable one an error
    fn read(&self) -> Result<Vec<SuggestionRecord>, serde_json::Error> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn set_aside_corrupt(&self, error: &serde_json::Error) {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".corrupt");
        let aside = self.path.with_file_name(name);
        match fs::rename(&self.path, &aside) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                moved_to = %aside.display(),
                %error,
                "suggestion log unreadable, starting a new one"
            ),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "cannot set aside unreadable suggestion log"),
        }
    }

    /// All records, oldest first; empty when missing or corrupt
    #[must_use]
    pub fn load_suggestions(&self) -> Vec<SuggestionRecord> {
        self.read().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable suggestion log");
            Vec::new()
        })
    }

    /// Newest `n` records, newest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<SuggestionRecord> {
        self.load_suggestions().into_iter().rev().take(n).collect()
    }

    /// Record whose id starts with `prefix`
    #[must_use]
    pub fn find(&self, prefix: &str) -> Option<SuggestionRecord> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return None;
        }
        self.load_suggestions()
            .into_iter()
            .rev()
            .find(|r| r.id.to_string().starts_with(&prefix))
    }

    /// Aggregate counts
    #[must_use]
    pub fn statistics(&self) -> SuggestionStatistics {
        let records = self.load_suggestions();
        let mut stats = SuggestionStatistics {
            total: records.len(),
            ..SuggestionStatistics::default()
        };
        let mut score_sum = 0.0;
        let mut scored = 0usize;
        for record in &records {
            if record.success {
                stats.successful += 1;
                if let Some(score) = record.score {
                    score_sum += score;
                    scored += 1;
                }
            }
            if record.applied {
                stats.applied += 1;
            }
            if let Some(strategy) = record.strategy {
                *stats.by_strategy.entry(strategy).or_insert(0) += 1;
            }
        }
        if scored > 0 {
            stats.average_score = Some(score_sum / scored as f64);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use tempfile::TempDir;

    fn record(score: Option<f64>, success: bool, strategy: Option<StrategyKind>) -> SuggestionRecord {
        let ctx = HealingContext::new("#submit").with_test_name("login");
        let mut result = HealingResult::failed(&Locator::new("#submit"), FailureReason::SuggestionOnly);
        result.success = success;
        result.reason = (!success).then_some(FailureReason::SuggestionOnly);
        result.score = score;
        result.strategy = strategy;
        SuggestionRecord::from_result(&ctx, &result, HealingMode::SuggestionOnly)
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn test_missing_file_is_empty() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("none.json"));
            assert!(store.load_suggestions().is_empty());
            assert!(store.recent(5).is_empty());
        }

        #[test]
        fn test_corrupt_file_is_empty() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("log.json");
            fs::write(&path, "{ not json").unwrap();
            let store = SuggestionStore::new(&path);
            assert!(store.load_suggestions().is_empty());
            store.store_suggestion(record(None, false, None)).unwrap();
            assert_eq!(store.load_suggestions().len(), 1);
            let aside = dir.path().join("log.json.corrupt");
            assert_eq!(fs::read_to_string(aside).unwrap(), "{ not json");
        }

        #[test]
        fn test_concurrent_writers_keep_every_record() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("log.json");
            let threads: Vec<_> = (0..8)
                .map(|_| {
                    // Separate store values for one path, as separate engines would hold
                    let store = SuggestionStore::new(&path);
                    std::thread::spawn(move || {
                        for _ in 0..10 {
                            store.store_suggestion(record(None, false, None)).unwrap();
                        }
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
            let records = SuggestionStore::new(&path).load_suggestions();
            assert_eq!(records.len(), 80);
            assert!(!dir.path().join("log.json.corrupt").exists());
        }

        #[test]
        fn test_no_temp_files_left_behind() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("log.json"));
            store.store_suggestion(record(None, false, None)).unwrap();
            store.store_suggestion(record(None, false, None)).unwrap();
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        }

        #[test]
        fn test_creates_parent_dirs_and_pretty_prints() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("a/b/log.json"));
            store.store_suggestion(record(None, false, None)).unwrap();
            let content = fs::read_to_string(store.path()).unwrap();
            assert!(content.starts_with("[\n"));
            assert!(content.contains("\"originalLocator\": \"#submit\""));
        }

        #[test]
        fn test_cap_drops_oldest() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("log.json")).with_max_suggestions(3);
            let mut ids = Vec::new();
            for _ in 0..5 {
                let r = record(None, false, None);
                ids.push(r.id);
                store.store_suggestion(r).unwrap();
            }
            let kept: Vec<Uuid> = store.load_suggestions().iter().map(|r| r.id).collect();
            assert_eq!(kept, ids[2..].to_vec());
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_recent_newest_first() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("log.json"));
            let first = record(None, false, None);
            let second = record(None, false, None);
            let second_id = second.id;
            store.store_suggestion(first).unwrap();
            store.store_suggestion(second).unwrap();
            let recent = store.recent(1);
            assert_eq!(recent.len(), 1);
            assert_eq!(recent[0].id, second_id);
        }

        #[test]
        fn test_find_by_prefix() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("log.json"));
            let r = record(None, false, None);
            let id = r.id.to_string();
            store.store_suggestion(r).unwrap();
            assert_eq!(store.find(&id[..8]).unwrap().id.to_string(), id);
            assert!(store.find("").is_none());
        }

        #[test]
        fn test_statistics() {
            let dir = TempDir::new().unwrap();
            let store = SuggestionStore::new(dir.path().join("log.json"));
            store
                .store_suggestion(record(Some(90.0), true, Some(StrategyKind::Attribute)))
                .unwrap();
            store
                .store_suggestion(record(Some(80.0), true, Some(StrategyKind::Attribute)))
                .unwrap();
            store
                .store_suggestion(record(Some(40.0), false, Some(StrategyKind::Text)))
                .unwrap();
            let stats = store.statistics();
            assert_eq!(stats.total, 3);
            assert_eq!(stats.successful, 2);
            assert_eq!(stats.applied, 0);
            assert!((stats.average_score.unwrap() - 85.0).abs() < f64::EPSILON);
            assert_eq!(stats.by_strategy.get(&StrategyKind::Attribute), Some(&2));
            assert_eq!(stats.by_strategy.get(&StrategyKind::Text), Some(&1));
        }
    }
}
