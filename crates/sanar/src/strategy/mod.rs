//! Candidate strategies.
//!
//! Each strategy reads the parsed locator and one element snapshot and
//! proposes replacement locators with a local confidence. Strategies never
//! fail: an element that cannot be evaluated is skipped.

mod attribute;
mod semantic;
mod structural;
mod text;
mod visual;

pub use attribute::AttributeStrategy;
pub use semantic::SemanticStrategy;
pub use structural::StructuralStrategy;
pub use text::TextStrategy;
pub use visual::VisualStrategy;

use async_trait::async_trait;
use std::fmt;

use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::document::{ElementHandle, HealingDocument};
use crate::locator::Locator;

/// One element snapshot shared by every strategy in an attempt
pub struct PageSnapshot<'a> {
    /// Elements in document order
    pub elements: Vec<ElementHandle>,
    /// Live document, for per-element queries such as computed style
    pub document: &'a dyn HealingDocument,
}

impl fmt::Debug for PageSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSnapshot")
            .field("elements", &self.elements.len())
            .finish_non_exhaustive()
    }
}

impl<'a> PageSnapshot<'a> {
    /// Create a snapshot
    #[must_use]
    pub fn new(elements: Vec<ElementHandle>, document: &'a dyn HealingDocument) -> Self {
        Self { elements, document }
    }

    /// Build a candidate if `locator` actually selects `element`.
    ///
    /// The uniqueness flag reflects how many snapshot elements match.
    #[must_use]
    pub fn propose(
        &self,
        locator: Locator,
        strategy: StrategyKind,
        element: &ElementHandle,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Option<Candidate> {
        let matches = locator.query_all(&self.elements);
        if !matches.iter().any(|m| m.handle == element.handle) {
            return None;
        }
        let unique = matches.len() == 1;
        Some(Candidate::new(locator, strategy, element, confidence, rationale).with_unique(unique))
    }
}

/// Capability shared by all strategies
#[async_trait]
pub trait CandidateStrategy: Send + Sync {
    /// Strategy identifier
    fn kind(&self) -> StrategyKind;

    /// Propose candidates for a failed locator
    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate>;
}

/// The closed set of strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Role and accessible name
    Semantic(SemanticStrategy),
    /// Visible text
    Text(TextStrategy),
    /// DOM shape
    Structural(StructuralStrategy),
    /// Attribute values
    Attribute(AttributeStrategy),
    /// Position, size and style
    Visual(VisualStrategy),
}

impl Strategy {
    /// Build the strategy for a configured name
    #[must_use]
    pub const fn from_kind(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Semantic => Self::Semantic(SemanticStrategy),
            StrategyKind::Text => Self::Text(TextStrategy),
            StrategyKind::Structural => Self::Structural(StructuralStrategy),
            StrategyKind::Attribute => Self::Attribute(AttributeStrategy),
            StrategyKind::Visual => Self::Visual(VisualStrategy),
        }
    }

    fn inner(&self) -> &dyn CandidateStrategy {
        match self {
            Self::Semantic(s) => s,
            Self::Text(s) => s,
            Self::Structural(s) => s,
            Self::Attribute(s) => s,
            Self::Visual(s) => s,
        }
    }
}

#[async_trait]
impl CandidateStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let candidates = self.inner().find_candidates(ctx, page).await;
        tracing::debug!(
            strategy = %self.kind(),
            count = candidates.len(),
            "strategy produced candidates"
        );
        candidates
    }
}

/// Keep the highest-confidence candidate per locator, first seen on ties
pub(crate) fn best_per_locator(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match out.iter_mut().find(|c| c.locator == candidate.locator) {
            Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
            Some(_) => {}
            None => out.push(candidate),
        }
    }
    out
}
