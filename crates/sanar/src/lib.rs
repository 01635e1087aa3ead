//! Sanar: self-healing locators for browser-driven tests
//!
//! Sanar (Spanish: "to heal") recovers from broken element locators. When a
//! locator stops resolving, a set of strategies inspects the current page
//! and proposes replacement locators; the engine scores and ranks them and,
//! depending on the configured mode, uses the best one for the rest of the
//! run or only records it as a suggestion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      SANAR Architecture                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ Healing      │   │ Healing      │   │ Strategies           │  │
//! │  │ Resolver     │──►│ Engine       │──►│ semantic, text,      │  │
//! │  │ (retry once) │   │ (rank, mode) │   │ structural, attribute│  │
//! │  └──────┬───────┘   └──────┬───────┘   │ visual               │  │
//! │         │                  │           └──────────────────────┘  │
//! │         ▼                  ▼                                     │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ Event sink   │   │ Suggestion   │──►│ Code modifier        │  │
//! │  │ locator-     │   │ store (JSON) │   │ (rewrite + backups)  │  │
//! │  │ healed       │   └──────────────┘   └──────────────────────┘  │
//! │  └──────────────┘                                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sanar::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(doc: &dyn HealingDocument) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HealingConfig::new().with_mode(HealingMode::Auto).with_threshold(85.0);
//! let engine = Arc::new(HealingEngine::try_new(config)?);
//! let resolver = HealingResolver::new(engine, doc);
//!
//! let ctx = HealingContext::new("#submit").with_test_name("login works");
//! match resolver.resolve_element(&ctx).await {
//!     Ok(resolution) => println!("clicked {}", resolution.value().handle),
//!     Err(failure) => eprintln!("{failure}"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod context;
mod document;
mod engine;
mod event;
mod locator;
mod modifier;
mod result;
mod retry;
mod scoring;
mod similarity;
mod store;

/// Candidate strategies
pub mod strategy;

pub use config::{
    ExcludePattern, HealingConfig, HealingMode, StrategyKind, StrategyWeights,
    DEFAULT_MAX_SUGGESTIONS, DEFAULT_STORAGE_PATH,
};
pub use context::{
    Candidate, EnvironmentSnapshot, FailureReason, HealingContext, HealingResult, ScoredCandidate,
};
pub use document::{ElementHandle, HealingDocument, MockDocument, NodeSummary, Screenshot};
pub use engine::{dedup_candidates, HealingEngine, HealingHandle};
pub use event::{EventSink, JsonLinesSink, LocatorHealedEvent, MemorySink};
pub use locator::{quote, BoundingBox, Locator, LocatorHints, Point, Selector};
pub use modifier::{
    cleanup_backups, create_backup, list_backups, restore_backup, BackupInfo,
    CodeModificationRequest, CodeModificationResult, CodeModifier, SEARCH_WINDOW,
};
pub use result::{
    classify_message, ClassifyFailure, HealError, HealResult, ResolveError, SelectorFailureKind,
};
pub use retry::{HealingFailure, HealingResolver, Resolution};
pub use scoring::{reliability, ScoreBreakdown, Scorer};
pub use similarity::{jaccard, token_similarity, tokenize, word_overlap};
pub use store::{
    CandidateSummary, SuggestionRecord, SuggestionStatistics, SuggestionStore,
    MAX_RECORD_CANDIDATES,
};

/// Everything needed to wire healing into a test driver
pub mod prelude {
    pub use super::config::*;
    pub use super::context::*;
    pub use super::document::*;
    pub use super::engine::*;
    pub use super::event::*;
    pub use super::locator::{Locator, Selector};
    pub use super::modifier::{CodeModificationRequest, CodeModificationResult, CodeModifier};
    pub use super::result::*;
    pub use super::retry::*;
    pub use super::store::*;
    pub use super::strategy::{CandidateStrategy, Strategy};
}
