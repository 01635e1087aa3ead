//! Healing orchestrator.
//!
//! One attempt: snapshot the page, fan out to every enabled strategy,
//! merge, score and rank the candidates, then apply the mode policy.
//! An attempt never fails; every unsuccessful outcome carries a
//! [`FailureReason`].

use futures::future::join_all;
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::config::{ExcludePattern, HealingConfig, HealingMode};
use crate::context::{
    Candidate, EnvironmentSnapshot, FailureReason, HealingContext, HealingResult, ScoredCandidate,
};
use crate::document::HealingDocument;
use crate::locator::Locator;
use crate::result::HealResult;
use crate::scoring::Scorer;
use crate::store::{SuggestionRecord, SuggestionStore};
use crate::strategy::{CandidateStrategy, PageSnapshot, Strategy};

/// Runs healing attempts for one configuration
#[derive(Debug)]
pub struct HealingEngine {
    config: HealingConfig,
    strategies: Vec<Strategy>,
    exclusions: Vec<ExcludePattern>,
    scorer: Scorer,
    store: Option<SuggestionStore>,
}

impl HealingEngine {
    /// Create an engine persisting to the configured store
    #[must_use]
    pub fn new(config: HealingConfig) -> Self {
        let strategies = config.strategies.iter().map(|k| Strategy::from_kind(*k)).collect();
        let exclusions = config
            .exclude_tests
            .iter()
            .filter_map(|p| {
                ExcludePattern::parse(p)
                    .map_err(|e| tracing::warn!(error = %e, "ignoring exclude pattern"))
                    .ok()
            })
            .collect();
        let scorer = Scorer::new(&config);
        let store = Some(SuggestionStore::from_config(&config));
        Self {
            config,
            strategies,
            exclusions,
            scorer,
            store,
        }
    }

    /// Validate the configuration, then create the engine
    pub fn try_new(config: HealingConfig) -> HealResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Persist to `store` instead of the configured location
    #[must_use]
    pub fn with_store(mut self, store: SuggestionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Do not persist attempts
    #[must_use]
    pub fn without_store(mut self) -> Self {
        self.store = None;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Suggestion store, if persisting
    #[must_use]
    pub const fn store(&self) -> Option<&SuggestionStore> {
        self.store.as_ref()
    }

    /// Try to find a replacement for a failed locator
    pub async fn attempt_healing(
        &self,
        ctx: &HealingContext,
        doc: &dyn HealingDocument,
    ) -> HealingResult {
        let started = Instant::now();

        if !self.config.enabled {
            return HealingResult::failed(&ctx.original, FailureReason::Disabled);
        }
        if let Some(test) = ctx.test_name.as_deref() {
            if self.exclusions.iter().any(|p| p.matches(test)) {
                tracing::debug!(test, "test excluded from healing");
                return HealingResult::failed(&ctx.original, FailureReason::Excluded);
            }
        }

        let environment = self.environment(ctx, doc).await;
        let mut result = match doc.elements().await {
            Ok(elements) => {
                let page = PageSnapshot::new(elements, doc);
                let candidates = self.collect(ctx, &page).await;
                let ranked = self.rank(ctx, candidates);
                self.decide(&ctx.original, ranked)
            }
            Err(e) => {
                tracing::warn!(error = %e, locator = %ctx.original, "element snapshot failed");
                HealingResult::failed(&ctx.original, FailureReason::DocumentUnavailable)
            }
        };
        result.environment = Some(environment);
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.persist(ctx, &result);
        if self.config.notify_on_heal {
            notify(&result);
        }
        result
    }

    async fn environment(
        &self,
        ctx: &HealingContext,
        doc: &dyn HealingDocument,
    ) -> EnvironmentSnapshot {
        let url = doc
            .url()
            .await
            .map_err(|e| tracing::warn!(error = %e, "cannot read page url"))
            .ok();
        let title = doc
            .title()
            .await
            .map_err(|e| tracing::warn!(error = %e, "cannot read page title"))
            .ok();
        let screenshot = if !self.config.capture_screenshot {
            None
        } else if let Some(shot) = ctx.screenshot.as_ref().filter(|s| s.is_valid()) {
            Some(shot.to_base64())
        } else {
            match doc.screenshot().await {
                Ok(shot) if shot.is_valid() => Some(shot.to_base64()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "screenshot capture failed");
                    None
                }
            }
        };
        EnvironmentSnapshot {
            url,
            title,
            timestamp: chrono::Utc::now().to_rfc3339(),
            screenshot,
        }
    }

    async fn collect(&self, ctx: &HealingContext, page: &PageSnapshot<'_>) -> Vec<Candidate> {
        let runs = self.strategies.iter().map(|s| s.find_candidates(ctx, page));
        let original = ctx.original.as_str().trim();
        let merged = join_all(runs)
            .await
            .into_iter()
            .flatten()
            .filter(|c| c.locator.as_str().trim() != original)
            .collect();
        dedup_candidates(merged)
    }

    /// Score and sort candidates, best first; unscorable ones are dropped
    #[must_use]
    pub fn rank(&self, ctx: &HealingContext, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter_map(|candidate| match self.scorer.score(&candidate, ctx) {
                Some(score) => Some(ScoredCandidate { candidate, score }),
                None => {
                    tracing::debug!(locator = %candidate.locator, "skipping unscorable candidate");
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| self.compare(a, b));
        scored
    }

    /// Unique matches first, then score desc, strategy priority, locator text
    fn compare(&self, a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
        let rounded = |s: f64| (s * 100.0).round() as i64;
        b.candidate
            .unique
            .cmp(&a.candidate.unique)
            .then_with(|| rounded(b.score).cmp(&rounded(a.score)))
            .then_with(|| {
                self.config
                    .priority(a.candidate.strategy)
                    .cmp(&self.config.priority(b.candidate.strategy))
            })
            .then_with(|| a.candidate.locator.as_str().cmp(b.candidate.locator.as_str()))
    }

    fn decide(&self, original: &Locator, ranked: Vec<ScoredCandidate>) -> HealingResult {
        let Some(top) = ranked.first() else {
            return HealingResult::failed(original, FailureReason::NoCandidates);
        };
        let mut result = HealingResult::failed(original, FailureReason::NoCandidates);
        result.score = Some(top.score);
        result.strategy = Some(top.candidate.strategy);

        match self.config.mode {
            HealingMode::Auto if top.score >= self.config.auto_apply_threshold => {
                result.success = true;
                result.applied = true;
                result.applied_locator = Some(top.candidate.locator.clone());
                result.reason = None;
            }
            HealingMode::Auto => result.reason = Some(FailureReason::BelowThreshold),
            HealingMode::Assisted => {
                result.success = true;
                result.reason = None;
            }
            HealingMode::SuggestionOnly => result.reason = Some(FailureReason::SuggestionOnly),
        }
        result.candidates = ranked;
        result
    }

    fn persist(&self, ctx: &HealingContext, result: &HealingResult) {
        let Some(store) = &self.store else {
            return;
        };
        let record = SuggestionRecord::from_result(ctx, result, self.config.mode);
        if let Err(e) = store.store_suggestion(record) {
            tracing::warn!(error = %e, path = %store.path().display(), "failed to store healing suggestion");
        }
    }
}

fn notify(result: &HealingResult) {
    let original = &result.original_locator;
    match (result.top(), result.reason) {
        (Some(top), None) if result.applied => tracing::info!(
            "healed {original} -> {} (score {:.1}, {})",
            top.candidate.locator,
            top.score,
            top.candidate.strategy
        ),
        (Some(top), None) => tracing::info!(
            "suggested {original} -> {} (score {:.1}, {}); not applied",
            top.candidate.locator,
            top.score,
            top.candidate.strategy
        ),
        (Some(top), Some(reason)) => tracing::info!(
            "could not heal {original} ({reason}); best candidate {} (score {:.1})",
            top.candidate.locator,
            top.score
        ),
        (None, reason) => tracing::info!(
            "could not heal {original} ({})",
            reason.unwrap_or(FailureReason::NoCandidates)
        ),
    }
}

/// One candidate per (locator, strategy): highest confidence, then first seen
#[must_use]
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match out.iter_mut().find(|c| {
            c.strategy == candidate.strategy && c.locator.as_str() == candidate.locator.as_str()
        }) {
            Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
            Some(_) => {}
            None => out.push(candidate),
        }
    }
    out
}

/// Swappable engine shared by concurrent callers.
///
/// Reconfiguration replaces the engine wholesale; attempts already holding
/// the previous `Arc` finish with it.
#[derive(Debug)]
pub struct HealingHandle {
    current: RwLock<Arc<HealingEngine>>,
}

impl HealingHandle {
    /// Wrap an engine
    #[must_use]
    pub fn new(engine: HealingEngine) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
        }
    }

    /// Validate `config` and build the first engine
    pub fn from_config(config: HealingConfig) -> HealResult<Self> {
        Ok(Self::new(HealingEngine::try_new(config)?))
    }

    /// Current engine
    #[must_use]
    pub fn engine(&self) -> Arc<HealingEngine> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the engine with one built from `config`
    pub fn reconfigure(&self, config: HealingConfig) -> HealResult<()> {
        self.replace(HealingEngine::try_new(config)?);
        Ok(())
    }

    /// Replace the engine
    pub fn replace(&self, engine: HealingEngine) {
        let engine = Arc::new(engine);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = engine;
        tracing::debug!("healing engine reconfigured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::document::{ElementHandle, MockDocument, Screenshot};
    use crate::strategy::test_support::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn engine(config: HealingConfig) -> HealingEngine {
        HealingEngine::new(config).without_store()
    }

    fn login_page() -> MockDocument {
        MockDocument::with_elements(vec![heading(), email_input(), submit_button()])
    }

    mod policy_tests {
        use super::*;

        #[tokio::test]
        async fn test_auto_applies_above_threshold() {
            let e = engine(HealingConfig::new().with_mode(HealingMode::Auto).with_threshold(85.0));
            let result = e.attempt_healing(&HealingContext::new("#submit"), &login_page()).await;
            assert!(result.success);
            assert!(result.applied);
            assert_eq!(
                result.applied_locator.as_ref().map(Locator::as_str),
                Some("[data-testid=\"submit-btn\"]")
            );
            assert_eq!(result.strategy, Some(StrategyKind::Attribute));
            assert!(result.reason.is_none());
        }

        #[tokio::test]
        async fn test_auto_below_threshold_keeps_candidates() {
            let e = engine(HealingConfig::new().with_mode(HealingMode::Auto).with_threshold(99.0));
            let result = e.attempt_healing(&HealingContext::new("#submit"), &login_page()).await;
            assert!(!result.success);
            assert!(!result.applied);
            assert_eq!(result.reason, Some(FailureReason::BelowThreshold));
            assert!(!result.candidates.is_empty());
        }

        #[tokio::test]
        async fn test_assisted_succeeds_without_applying() {
            let e = engine(HealingConfig::new().with_mode(HealingMode::Assisted));
            let result = e.attempt_healing(&HealingContext::new("#submit"), &login_page()).await;
            assert!(result.success);
            assert!(!result.applied);
            assert!(result.applied_locator.is_none());
        }

        #[tokio::test]
        async fn test_suggestion_only_never_applies() {
            let e = engine(HealingConfig::new());
            let result = e.attempt_healing(&HealingContext::new("#submit"), &login_page()).await;
            assert!(!result.success);
            assert!(!result.applied);
            assert_eq!(result.reason, Some(FailureReason::SuggestionOnly));
            assert!(!result.candidates.is_empty());
        }
    }

    mod short_circuit_tests {
        use super::*;

        #[tokio::test]
        async fn test_disabled() {
            let doc = login_page();
            let e = engine(HealingConfig::new().with_enabled(false));
            let result = e.attempt_healing(&HealingContext::new("#submit"), &doc).await;
            assert_eq!(result.reason, Some(FailureReason::Disabled));
            assert_eq!(doc.elements_calls(), 0);
        }

        #[tokio::test]
        async fn test_excluded() {
            let doc = login_page();
            let e = engine(HealingConfig::new().exclude("checkout*"));
            let ctx = HealingContext::new("#submit").with_test_name("checkout flow");
            let result = e.attempt_healing(&ctx, &doc).await;
            assert_eq!(result.reason, Some(FailureReason::Excluded));
            assert!(result.candidates.is_empty());
            assert!(doc.history().is_empty());
        }

        #[tokio::test]
        async fn test_document_unavailable() {
            let mut doc = login_page();
            doc.unavailable = true;
            let e = engine(HealingConfig::new());
            let result = e.attempt_healing(&HealingContext::new("#submit"), &doc).await;
            assert_eq!(result.reason, Some(FailureReason::DocumentUnavailable));
            assert!(result.environment.is_some());
        }

        #[tokio::test]
        async fn test_no_candidates() {
            let doc = MockDocument::with_elements(vec![ElementHandle::new("d", "div")]);
            let e = engine(HealingConfig::new().with_mode(HealingMode::Auto));
            let result = e
                .attempt_healing(&HealingContext::new("#nothing-like-this"), &doc)
                .await;
            assert!(!result.success);
            assert_eq!(result.reason, Some(FailureReason::NoCandidates));
        }
    }

    mod ranking_tests {
        use super::*;

        #[tokio::test]
        async fn test_original_locator_never_proposed() {
            let e = engine(HealingConfig::new());
            let ctx = HealingContext::new("[data-testid=\"submit-btn\"]");
            let result = e.attempt_healing(&ctx, &login_page()).await;
            assert!(result
                .candidates
                .iter()
                .all(|c| c.candidate.locator.as_str() != ctx.original.as_str()));
        }

        #[tokio::test]
        async fn test_deterministic() {
            let e = engine(HealingConfig::new().with_strategies(StrategyKind::ALL.to_vec()));
            let ctx = HealingContext::new("#submit").with_previous_element(submit_button());
            let doc = login_page();
            let first = e.attempt_healing(&ctx, &doc).await;
            let second = e.attempt_healing(&ctx, &doc).await;
            let locators = |r: &HealingResult| {
                r.candidates
                    .iter()
                    .map(|c| (c.candidate.locator.to_string(), c.candidate.strategy, c.score))
                    .collect::<Vec<_>>()
            };
            assert_eq!(locators(&first), locators(&second));
        }

        #[tokio::test]
        async fn test_unique_first_then_score() {
            let e = engine(HealingConfig::new().with_strategies(StrategyKind::ALL.to_vec()));
            let result = e.attempt_healing(&HealingContext::new("#submit"), &login_page()).await;
            assert!(result.candidates.windows(2).all(|w| {
                let (a, b) = (&w[0], &w[1]);
                a.candidate.unique > b.candidate.unique
                    || (a.candidate.unique == b.candidate.unique
                        && (a.score * 100.0).round() >= (b.score * 100.0).round())
            }));
        }

        #[test]
        fn test_unique_lower_score_outranks_shared_match() {
            let e = engine(HealingConfig::new().with_mode(HealingMode::Auto).with_threshold(50.0));
            let el = submit_button();
            let shared = ScoredCandidate {
                candidate: Candidate::new(Locator::new("button"), StrategyKind::Structural, &el, 0.9, "t")
                    .with_unique(false),
                score: 91.0,
            };
            let unique = ScoredCandidate {
                candidate: Candidate::new(Locator::new("#login-btn"), StrategyKind::Attribute, &el, 0.8, "t")
                    .with_unique(true),
                score: 90.0,
            };
            assert_eq!(e.compare(&unique, &shared), Ordering::Less);

            let mut ranked = vec![shared, unique];
            ranked.sort_by(|a, b| e.compare(a, b));
            let result = e.decide(&Locator::new("#submit"), ranked);
            assert!(result.applied);
            assert_eq!(
                result.applied_locator.as_ref().map(Locator::as_str),
                Some("#login-btn")
            );
        }

        #[test]
        fn test_tie_broken_by_uniqueness_then_priority() {
            let e = engine(HealingConfig::new());
            let el = submit_button();
            let scored = |locator: &str, kind: StrategyKind, unique: bool| ScoredCandidate {
                candidate: Candidate::new(Locator::new(locator), kind, &el, 0.8, "t")
                    .with_unique(unique),
                score: 80.004,
            };
            let text = scored("text=\"Submit\"", StrategyKind::Text, true);
            let semantic = scored("role=button", StrategyKind::Semantic, true);
            let shared = scored("button", StrategyKind::Semantic, false);
            assert_eq!(e.compare(&semantic, &text), Ordering::Less);
            assert_eq!(e.compare(&text, &shared), Ordering::Less);

            let mut higher = scored("#z", StrategyKind::Attribute, true);
            higher.score = 80.1;
            assert_eq!(e.compare(&higher, &semantic), Ordering::Less);
        }
    }

    mod persistence_tests {
        use super::*;

        #[tokio::test]
        async fn test_attempt_is_stored() {
            let dir = TempDir::new().unwrap();
            let config = HealingConfig::new().with_storage_path(dir.path().join("log.json"));
            let e = HealingEngine::new(config);
            let ctx = HealingContext::new("#submit")
                .with_test_name("login")
                .with_source("tests/login.spec.ts", 3);
            e.attempt_healing(&ctx, &login_page()).await;
            let records = e.store().unwrap().load_suggestions();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].original_locator, "#submit");
            assert_eq!(records[0].line_number, Some(3));
            assert!(records[0].healed_locator.is_some());
        }

        #[tokio::test]
        async fn test_store_failure_is_not_fatal() {
            let dir = TempDir::new().unwrap();
            let blocker = dir.path().join("file");
            std::fs::write(&blocker, "x").unwrap();
            let config = HealingConfig::new()
                .with_mode(HealingMode::Auto)
                .with_storage_path(blocker.join("log.json"));
            let result = HealingEngine::new(config)
                .attempt_healing(&HealingContext::new("#submit"), &login_page())
                .await;
            assert!(result.success);
        }

        #[tokio::test]
        async fn test_screenshot_captured_when_configured() {
            let mut doc = login_page();
            doc.set_screenshot(Screenshot::new(vec![1, 2, 3], 10, 10));
            let mut config = HealingConfig::new();
            config.capture_screenshot = true;
            let result = engine(config)
                .attempt_healing(&HealingContext::new("#submit"), &doc)
                .await;
            assert!(result.environment.unwrap().screenshot.is_some());
        }
    }

    mod handle_tests {
        use super::*;

        #[test]
        fn test_reconfigure_swaps_engine() {
            let handle = HealingHandle::new(engine(HealingConfig::new()));
            let before = handle.engine();
            handle
                .reconfigure(HealingConfig::new().with_mode(HealingMode::Auto))
                .unwrap();
            assert_eq!(before.config().mode, HealingMode::SuggestionOnly);
            assert_eq!(handle.engine().config().mode, HealingMode::Auto);
        }

        #[test]
        fn test_reconfigure_rejects_invalid() {
            let handle = HealingHandle::new(engine(HealingConfig::new()));
            assert!(handle
                .reconfigure(HealingConfig::new().with_threshold(150.0))
                .is_err());
            assert_eq!(handle.engine().config().auto_apply_threshold, 90.0);
        }
    }

    proptest! {
        #[test]
        fn prop_dedup_unique_pairs(picks in proptest::collection::vec((0usize..3, 0usize..5, 0.0f64..=1.0), 0..30)) {
            let el = submit_button();
            let locators = ["#a", "#b", "#c"];
            let candidates: Vec<Candidate> = picks
                .iter()
                .map(|(l, k, conf)| {
                    Candidate::new(Locator::new(locators[*l]), StrategyKind::ALL[*k], &el, *conf, "p")
                })
                .collect();
            let out = dedup_candidates(candidates.clone());
            for (i, a) in out.iter().enumerate() {
                for b in &out[i + 1..] {
                    prop_assert!(!(a.locator == b.locator && a.strategy == b.strategy));
                }
                let best = candidates
                    .iter()
                    .filter(|c| c.locator == a.locator && c.strategy == a.strategy)
                    .map(|c| c.confidence)
                    .fold(0.0f64, f64::max);
                prop_assert!((a.confidence - best).abs() < f64::EPSILON);
            }
        }
    }
}
