//! Healing configuration.
//!
//! Loaded from JSON or YAML (camelCase keys). A configuration is immutable
//! once handed to an engine; replacing it builds a new engine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::result::{HealError, HealResult};

/// Default location of the persisted suggestion log
pub const DEFAULT_STORAGE_PATH: &str = ".sanar/healing-suggestions.json";

/// Default retention cap for the suggestion log
pub const DEFAULT_MAX_SUGGESTIONS: usize = 100;

/// How a healing decision is acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealingMode {
    /// Apply the best candidate when it clears the threshold
    Auto,
    /// Use the best candidate for the run, never apply to code
    Assisted,
    /// Only record suggestions
    #[default]
    SuggestionOnly,
}

impl fmt::Display for HealingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Assisted => write!(f, "assisted"),
            Self::SuggestionOnly => write!(f, "suggestion-only"),
        }
    }
}

/// Strategy identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Role and accessible-name matching
    Semantic,
    /// Visible text matching
    Text,
    /// DOM shape matching
    Structural,
    /// Attribute value matching
    Attribute,
    /// Position, size and style matching
    Visual,
}

impl StrategyKind {
    /// All strategies in default priority order
    pub const ALL: [Self; 5] = [
        Self::Semantic,
        Self::Text,
        Self::Structural,
        Self::Attribute,
        Self::Visual,
    ];

    /// Configuration name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Text => "text",
            Self::Structural => "structural",
            Self::Attribute => "attribute",
            Self::Visual => "visual",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HealError::config(format!("Unknown strategy: {s}")))
    }
}

/// Relative weight of each strategy in the final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyWeights {
    /// Semantic weight
    pub semantic: f64,
    /// Text weight
    pub text: f64,
    /// Structural weight
    pub structural: f64,
    /// Attribute weight
    pub attribute: f64,
    /// Visual weight
    pub visual: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            semantic: 40.0,
            text: 25.0,
            structural: 20.0,
            attribute: 15.0,
            visual: 15.0,
        }
    }
}

impl StrategyWeights {
    /// Weight of one strategy
    #[must_use]
    pub fn get(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::Semantic => self.semantic,
            StrategyKind::Text => self.text,
            StrategyKind::Structural => self.structural,
            StrategyKind::Attribute => self.attribute,
            StrategyKind::Visual => self.visual,
        }
    }

    fn set(&mut self, kind: StrategyKind, value: f64) {
        match kind {
            StrategyKind::Semantic => self.semantic = value,
            StrategyKind::Text => self.text = value,
            StrategyKind::Structural => self.structural = value,
            StrategyKind::Attribute => self.attribute = value,
            StrategyKind::Visual => self.visual = value,
        }
    }

    /// Rescale so the enabled strategies sum to 100; disabled ones become 0
    #[must_use]
    pub fn normalized(&self, enabled: &[StrategyKind]) -> Self {
        let total: f64 = enabled.iter().map(|k| self.get(*k).max(0.0)).sum();
        let mut out = Self {
            semantic: 0.0,
            text: 0.0,
            structural: 0.0,
            attribute: 0.0,
            visual: 0.0,
        };
        for kind in enabled {
            let share = if total > 0.0 {
                self.get(*kind).max(0.0) / total * 100.0
            } else {
                100.0 / enabled.len() as f64
            };
            out.set(*kind, share);
        }
        out
    }

    /// Largest weight among `enabled`
    #[must_use]
    pub fn max_of(&self, enabled: &[StrategyKind]) -> f64 {
        enabled.iter().map(|k| self.get(*k)).fold(0.0, f64::max)
    }
}

/// Pattern matched against test identifiers, compiled once
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    /// Contains substring
    Contains(String),
    /// Glob pattern (e.g., "checkout*flaky", "smoke-?", "[ab]*")
    Glob(glob::Pattern),
    /// Regex match (written `re:<pattern>`)
    Regex(Regex),
}

impl ExcludePattern {
    /// Compile a configured pattern string
    pub fn parse(pattern: &str) -> HealResult<Self> {
        let invalid =
            |e: &dyn fmt::Display| HealError::config(format!("Invalid exclude pattern {pattern:?}: {e}"));
        if let Some(re) = pattern.strip_prefix("re:") {
            Regex::new(re).map(Self::Regex).map_err(|e| invalid(&e))
        } else if pattern.contains(['*', '?']) {
            glob::Pattern::new(pattern)
                .map(Self::Glob)
                .map_err(|e| invalid(&e))
        } else {
            Ok(Self::Contains(pattern.to_string()))
        }
    }

    /// Check if a test identifier matches this pattern
    #[must_use]
    pub fn matches(&self, test_name: &str) -> bool {
        match self {
            Self::Contains(pattern) => test_name.contains(pattern.as_str()),
            Self::Regex(re) => re.is_match(test_name),
            Self::Glob(pattern) => pattern.matches(test_name),
        }
    }
}

/// Configuration for the healing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealingConfig {
    /// Master switch
    pub enabled: bool,
    /// Decision policy
    pub mode: HealingMode,
    /// Minimum score (0-100) for auto-apply
    pub auto_apply_threshold: f64,
    /// Enabled strategies, in priority order
    pub strategies: Vec<StrategyKind>,
    /// Suggestion log location
    pub storage_path: PathBuf,
    /// Log a line whenever a healing attempt finishes
    pub notify_on_heal: bool,
    /// Test identifiers that must never be healed
    pub exclude_tests: Vec<String>,
    /// Reserved; accepted and ignored
    pub learn_from_manual_selections: bool,
    /// Retention cap for the suggestion log
    pub max_suggestions: usize,
    /// Per-strategy weights
    pub strategy_weights: StrategyWeights,
    /// Attach a screenshot to the environment snapshot
    pub capture_screenshot: bool,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: HealingMode::SuggestionOnly,
            auto_apply_threshold: 90.0,
            strategies: vec![
                StrategyKind::Semantic,
                StrategyKind::Text,
                StrategyKind::Structural,
                StrategyKind::Attribute,
            ],
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            notify_on_heal: true,
            exclude_tests: Vec::new(),
            learn_from_manual_selections: false,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            strategy_weights: StrategyWeights::default(),
            capture_screenshot: false,
        }
    }
}

impl HealingConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decision policy
    #[must_use]
    pub const fn with_mode(mut self, mode: HealingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the auto-apply threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.auto_apply_threshold = threshold;
        self
    }

    /// Set the enabled strategies
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Set the suggestion log location
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Add an exclusion pattern
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_tests.push(pattern.into());
        self
    }

    /// Enable or disable healing
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable or disable the notify line
    #[must_use]
    pub const fn with_notify(mut self, notify: bool) -> Self {
        self.notify_on_heal = notify;
        self
    }

    /// Parse JSON configuration
    pub fn from_json_str(json: &str) -> HealResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse YAML configuration
    pub fn from_yaml_str(yaml: &str) -> HealResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file and validate
    pub fn load(path: &Path) -> HealResult<Self> {
        if !path.exists() {
            return Err(HealError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => {
                return Err(HealError::config(format!(
                    "Unsupported config extension: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and pattern syntax
    pub fn validate(&self) -> HealResult<()> {
        if !(0.0..=100.0).contains(&self.auto_apply_threshold) {
            return Err(HealError::config(format!(
                "autoApplyThreshold must be within 0-100, got {}",
                self.auto_apply_threshold
            )));
        }
        if self.max_suggestions == 0 {
            return Err(HealError::config("maxSuggestions must be at least 1"));
        }
        for kind in StrategyKind::ALL {
            let w = self.strategy_weights.get(kind);
            if !w.is_finite() || w < 0.0 {
                return Err(HealError::config(format!(
                    "strategyWeights.{kind} must be a non-negative number"
                )));
            }
        }
        for (i, kind) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(kind) {
                return Err(HealError::config(format!("Strategy listed twice: {kind}")));
            }
        }
        self.exclude_patterns()?;
        Ok(())
    }

    /// Compile every exclusion pattern
    pub fn exclude_patterns(&self) -> HealResult<Vec<ExcludePattern>> {
        self.exclude_tests
            .iter()
            .map(|p| ExcludePattern::parse(p))
            .collect()
    }

    /// Weights renormalized over the enabled strategies
    #[must_use]
    pub fn effective_weights(&self) -> StrategyWeights {
        self.strategy_weights.normalized(&self.strategies)
    }

    /// Position of a strategy in the configured order (lower wins ties)
    #[must_use]
    pub fn priority(&self, kind: StrategyKind) -> usize {
        self.strategies
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.strategies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn excluded(config: &HealingConfig, name: &str) -> bool {
        config
            .exclude_patterns()
            .unwrap()
            .iter()
            .any(|p| p.matches(name))
    }

    mod default_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = HealingConfig::default();
            assert!(config.enabled);
            assert_eq!(config.mode, HealingMode::SuggestionOnly);
            assert!((config.auto_apply_threshold - 90.0).abs() < f64::EPSILON);
            assert_eq!(config.strategies.len(), 4);
            assert!(!config.strategies.contains(&StrategyKind::Visual));
            assert_eq!(config.max_suggestions, 100);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_builders() {
            let config = HealingConfig::new()
                .with_mode(HealingMode::Auto)
                .with_threshold(85.0)
                .exclude("flaky");
            assert_eq!(config.mode, HealingMode::Auto);
            assert!(excluded(&config, "checkout flaky test"));
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_from_json_camel_case() {
            let config = HealingConfig::from_json_str(
                r#"{"mode":"auto","autoApplyThreshold":85,"strategies":["attribute","text"],"excludeTests":["re:^smoke"]}"#,
            )
            .unwrap();
            assert_eq!(config.mode, HealingMode::Auto);
            assert_eq!(
                config.strategies,
                vec![StrategyKind::Attribute, StrategyKind::Text]
            );
            assert!(excluded(&config, "smoke: login"));
            assert!(!excluded(&config, "login smoke"));
            assert!(config.notify_on_heal);
        }

        #[test]
        fn test_from_yaml() {
            let config = HealingConfig::from_yaml_str(
                "mode: assisted\nmaxSuggestions: 10\nstrategyWeights:\n  visual: 30\n",
            )
            .unwrap();
            assert_eq!(config.mode, HealingMode::Assisted);
            assert_eq!(config.max_suggestions, 10);
            assert!((config.strategy_weights.visual - 30.0).abs() < f64::EPSILON);
            assert!((config.strategy_weights.semantic - 40.0).abs() < f64::EPSILON);
        }

        #[test]
        fn test_unknown_mode_rejected() {
            assert!(HealingConfig::from_json_str(r#"{"mode":"yolo"}"#).is_err());
        }

        #[test]
        fn test_strategy_from_str() {
            assert_eq!(
                "Semantic".parse::<StrategyKind>().unwrap(),
                StrategyKind::Semantic
            );
            assert!("magic".parse::<StrategyKind>().is_err());
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_threshold_range() {
            assert!(HealingConfig::new().with_threshold(101.0).validate().is_err());
            assert!(HealingConfig::new().with_threshold(-1.0).validate().is_err());
        }

        #[test]
        fn test_duplicate_strategy() {
            let config = HealingConfig::new()
                .with_strategies(vec![StrategyKind::Text, StrategyKind::Text]);
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_bad_regex() {
            let err = HealingConfig::new().exclude("re:(").validate().unwrap_err();
            assert!(err.to_string().contains("re:("));
        }

        #[test]
        fn test_bad_glob() {
            assert!(HealingConfig::new().exclude("smoke-[*").validate().is_err());
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_load_by_extension() {
            let dir = TempDir::new().unwrap();
            let json = dir.path().join("healing.json");
            std::fs::write(&json, r#"{"mode":"auto"}"#).unwrap();
            assert_eq!(HealingConfig::load(&json).unwrap().mode, HealingMode::Auto);

            let yaml = dir.path().join("healing.yml");
            std::fs::write(&yaml, "enabled: false\n").unwrap();
            assert!(!HealingConfig::load(&yaml).unwrap().enabled);
        }

        #[test]
        fn test_load_missing_and_unknown() {
            let dir = TempDir::new().unwrap();
            assert!(matches!(
                HealingConfig::load(&dir.path().join("none.json")),
                Err(HealError::FileNotFound { .. })
            ));
            let toml = dir.path().join("healing.toml");
            std::fs::write(&toml, "").unwrap();
            assert!(matches!(
                HealingConfig::load(&toml),
                Err(HealError::Config { .. })
            ));
        }
    }

    mod weight_tests {
        use super::*;

        #[test]
        fn test_normalized_sums_to_100() {
            let w = StrategyWeights::default().normalized(&[
                StrategyKind::Semantic,
                StrategyKind::Visual,
            ]);
            assert!((w.semantic + w.visual - 100.0).abs() < 1e-9);
            assert!((w.semantic - 40.0 / 55.0 * 100.0).abs() < 1e-9);
            assert_eq!(w.text, 0.0);
        }

        #[test]
        fn test_priority() {
            let config = HealingConfig::default();
            assert_eq!(config.priority(StrategyKind::Semantic), 0);
            assert_eq!(config.priority(StrategyKind::Visual), 4);
        }
    }

    mod exclude_tests {
        use super::*;

        fn is_match(pattern: &str, name: &str) -> bool {
            ExcludePattern::parse(pattern).unwrap().matches(name)
        }

        #[test]
        fn test_pattern_kinds() {
            assert!(matches!(ExcludePattern::parse("a*").unwrap(), ExcludePattern::Glob(_)));
            assert!(matches!(ExcludePattern::parse("re:a").unwrap(), ExcludePattern::Regex(_)));
            assert!(matches!(ExcludePattern::parse("a").unwrap(), ExcludePattern::Contains(_)));
            assert!(is_match("checkout*", "checkout > pays"));
            assert!(!is_match("checkout*", "the checkout"));
            assert!(is_match("*flaky*", "a flaky one"));
            assert!(is_match("re:\\d+$", "case 42"));
            assert!(is_match("legacy", "legacy login"));
        }

        #[test]
        fn test_glob_repeated_suffix() {
            assert!(is_match("checkout*flaky", "checkout flaky flaky"));
            assert!(is_match("checkout*flaky", "checkout flaky"));
            assert!(!is_match("checkout*flaky", "checkout flaky later"));
        }

        #[test]
        fn test_glob_single_char_and_class() {
            assert!(is_match("smoke-?", "smoke-1"));
            assert!(!is_match("smoke-?", "smoke-12"));
            assert!(is_match("[ab]*", "billing"));
            assert!(!is_match("[ab]*", "checkout"));
        }

        #[test]
        fn test_invalid_patterns_rejected() {
            assert!(ExcludePattern::parse("re:(").is_err());
            assert!(ExcludePattern::parse("a[*").is_err());
        }
    }
}
