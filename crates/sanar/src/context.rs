//! Inputs and outputs of one healing attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::StrategyKind;
use crate::document::{ElementHandle, Screenshot};
use crate::locator::Locator;

/// Everything known about a failed resolution
#[derive(Debug, Clone)]
pub struct HealingContext {
    /// Locator that failed
    pub original: Locator,
    /// Test identifier
    pub test_name: Option<String>,
    /// Source file containing the locator
    pub file_path: Option<PathBuf>,
    /// 1-based source line
    pub line_number: Option<usize>,
    /// Screenshot taken at failure time
    pub screenshot: Option<Screenshot>,
    /// Element the locator matched on the last successful run
    pub previous_element: Option<ElementHandle>,
}

impl HealingContext {
    /// Create a context for a failed locator
    #[must_use]
    pub fn new(original: impl Into<Locator>) -> Self {
        Self {
            original: original.into(),
            test_name: None,
            file_path: None,
            line_number: None,
            screenshot: None,
            previous_element: None,
        }
    }

    /// Set the test identifier
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Set the source location
    #[must_use]
    pub fn with_source(mut self, file: impl Into<PathBuf>, line: usize) -> Self {
        self.file_path = Some(file.into());
        self.line_number = Some(line);
        self
    }

    /// Attach a screenshot
    #[must_use]
    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    /// Set the previously matched element
    #[must_use]
    pub fn with_previous_element(mut self, element: ElementHandle) -> Self {
        self.previous_element = Some(element);
        self
    }
}

/// A replacement locator proposed by one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Proposed locator
    pub locator: Locator,
    /// Producing strategy
    pub strategy: StrategyKind,
    /// Element the locator points at
    pub element: ElementHandle,
    /// Human-readable reason
    pub rationale: String,
    /// Strategy-local confidence in [0, 1]
    pub confidence: f64,
    /// The locator matches exactly one element in the snapshot
    pub unique: bool,
}

impl Candidate {
    /// Create a candidate; confidence is clamped to [0, 1]
    #[must_use]
    pub fn new(
        locator: Locator,
        strategy: StrategyKind,
        element: &ElementHandle,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            locator,
            strategy,
            element: element.clone(),
            rationale: rationale.into(),
            confidence: confidence.clamp(0.0, 1.0),
            unique: true,
        }
    }

    /// Set the uniqueness flag
    #[must_use]
    pub const fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Candidate with its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    /// Candidate
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Score in [0, 100]
    pub score: f64,
}

/// Why a healing attempt did not produce a usable locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Healing is switched off
    Disabled,
    /// The test is excluded
    Excluded,
    /// The element snapshot could not be taken
    DocumentUnavailable,
    /// No strategy produced a candidate
    NoCandidates,
    /// Auto mode, best score under the threshold
    BelowThreshold,
    /// Suggestion-only mode
    SuggestionOnly,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Excluded => "excluded",
            Self::DocumentUnavailable => "document-unavailable",
            Self::NoCandidates => "no-candidates",
            Self::BelowThreshold => "below-threshold",
            Self::SuggestionOnly => "suggestion-only",
        };
        f.write_str(s)
    }
}

/// Page state at the time of the attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    /// Page URL
    pub url: Option<String>,
    /// Page title
    pub title: Option<String>,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Base64 PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Outcome of one healing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingResult {
    /// A locator is usable for this run
    pub success: bool,
    /// The locator was auto-applied
    pub applied: bool,
    /// Auto-applied locator
    pub applied_locator: Option<Locator>,
    /// Score of the top candidate
    pub score: Option<f64>,
    /// Strategy of the top candidate
    pub strategy: Option<StrategyKind>,
    /// All candidates, best first
    pub candidates: Vec<ScoredCandidate>,
    /// Failure reason when `success` is false
    pub reason: Option<FailureReason>,
    /// Locator that failed
    pub original_locator: Locator,
    /// Page state
    pub environment: Option<EnvironmentSnapshot>,
    /// Wall-clock duration of the attempt
    pub duration_ms: u64,
}

impl HealingResult {
    /// A result with no candidates and the given reason
    #[must_use]
    pub fn failed(original: &Locator, reason: FailureReason) -> Self {
        Self {
            success: false,
            applied: false,
            applied_locator: None,
            score: None,
            strategy: None,
            candidates: Vec::new(),
            reason: Some(reason),
            original_locator: original.clone(),
            environment: None,
            duration_ms: 0,
        }
    }

    /// Best candidate, if any
    #[must_use]
    pub fn top(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }
}
