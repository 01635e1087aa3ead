//! Result and error types for Sanar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Sanar operations
pub type HealResult<T> = Result<T, HealError>;

/// Errors that can occur in Sanar
#[derive(Debug, Error)]
pub enum HealError {
    /// Invalid healing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The automation layer could not answer a document query
    #[error("Document error: {message}")]
    Document {
        /// Error message
        message: String,
    },

    /// Screenshot capture failed
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Suggestion store could not be written
    #[error("Suggestion store error: {message}")]
    Store {
        /// Error message
        message: String,
    },

    /// Target source file does not exist
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Original locator text not present near the target line
    #[error("Locator {locator:?} not found within ±{window} lines of line {line}")]
    LocatorNotFound {
        /// Locator text searched for
        locator: String,
        /// 1-based target line
        line: usize,
        /// Search radius in lines
        window: usize,
    },

    /// Replacement text cannot be spliced into a single line
    #[error("Invalid replacement: {message}")]
    InvalidReplacement {
        /// Error message
        message: String,
    },

    /// Backup creation or restore failed
    #[error("Backup error: {message}")]
    Backup {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HealError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a document error
    #[must_use]
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }
}

/// Symptom classes of a failed element resolution that healing may recover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorFailureKind {
    /// Nothing matched the locator
    NotFound,
    /// The matched element is no longer attached to the document
    Detached,
    /// Waiting for the locator timed out
    Timeout,
    /// Strict mode violation: more than one element matched
    MultipleMatches,
}

impl fmt::Display for SelectorFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::Detached => write!(f, "detached"),
            Self::Timeout => write!(f, "timeout"),
            Self::MultipleMatches => write!(f, "multiple-matches"),
        }
    }
}

/// Error raised when resolving a locator against a live document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No element matched
    #[error("No element found for locator {locator:?}")]
    NotFound {
        /// Locator text
        locator: String,
    },

    /// Element was matched but is detached from the DOM
    #[error("Element for locator {locator:?} is not attached to the DOM")]
    Detached {
        /// Locator text
        locator: String,
    },

    /// Resolution timed out
    #[error("Timed out after {ms}ms waiting for locator {locator:?}")]
    Timeout {
        /// Locator text
        locator: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Strict mode violation
    #[error("Strict mode violation: locator {locator:?} resolved to {count} elements")]
    MultipleMatches {
        /// Locator text
        locator: String,
        /// Number of matches
        count: usize,
    },

    /// Anything else reported by the automation layer
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Decides whether an error is a selector-resolution failure.
///
/// Errors outside the taxonomy bypass healing entirely.
pub trait ClassifyFailure: fmt::Display {
    /// Selector failure class, or `None` when healing must not be attempted
    fn selector_failure(&self) -> Option<SelectorFailureKind> {
        classify_message(&self.to_string())
    }
}

impl ClassifyFailure for ResolveError {
    fn selector_failure(&self) -> Option<SelectorFailureKind> {
        match self {
            Self::NotFound { .. } => Some(SelectorFailureKind::NotFound),
            Self::Detached { .. } => Some(SelectorFailureKind::Detached),
            Self::Timeout { .. } => Some(SelectorFailureKind::Timeout),
            Self::MultipleMatches { .. } => Some(SelectorFailureKind::MultipleMatches),
            Self::Other { message } => classify_message(message),
        }
    }
}

impl ClassifyFailure for HealError {
    /// Only document failures can be selector failures; file, config and
    /// store errors never trigger healing
    fn selector_failure(&self) -> Option<SelectorFailureKind> {
        match self {
            Self::Document { message } => classify_message(message),
            _ => None,
        }
    }
}

impl ClassifyFailure for String {}

/// Classify a free-form automation error message.
#[must_use]
pub fn classify_message(message: &str) -> Option<SelectorFailureKind> {
    let msg = message.to_lowercase();

    if msg.contains("strict mode violation")
        || msg.contains("multiple elements")
        || (msg.contains("resolved to") && msg.contains("elements"))
    {
        return Some(SelectorFailureKind::MultipleMatches);
    }
    if msg.contains("not attached") || msg.contains("detached") || msg.contains("stale element")
    {
        return Some(SelectorFailureKind::Detached);
    }
    if msg.contains("timeout") || msg.contains("timed out") {
        return Some(SelectorFailureKind::Timeout);
    }
    if msg.contains("not found")
        || msg.contains("no element")
        || msg.contains("no such element")
        || msg.contains("unable to locate")
        || msg.contains("waiting for locator")
    {
        return Some(SelectorFailureKind::NotFound);
    }
    None
}
