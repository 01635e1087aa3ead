//! Structural strategy: DOM shape matching.
//!
//! Signature = tag, classes, parent tag, depth. Proposes shorter variants
//! of the original query, class-overlap selectors and same-tag siblings.

use async_trait::async_trait;

use super::{best_per_locator, CandidateStrategy, PageSnapshot};
use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::document::ElementHandle;
use crate::locator::{steps_to_css, Combinator, Locator, Selector, Step};
use crate::similarity::jaccard;

/// Confidence of a hierarchy-reduced variant that still matches
const REDUCED_CONFIDENCE: f64 = 0.75;
/// Confidence of a same-tag, same-position candidate
const SAME_TAG_CONFIDENCE: f64 = 0.45;
/// Minimum class Jaccard index
const MIN_CLASS_OVERLAP: f64 = 0.5;
/// Cap on same-tag candidates
const MAX_SAME_TAG: usize = 5;

/// DOM shape matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralStrategy;

impl StructuralStrategy {
    /// Drop leading compounds one at a time, keeping variants that match
    fn reduced_candidates(steps: &[Step], page: &PageSnapshot<'_>) -> Vec<Candidate> {
        let mut out = Vec::new();
        for start in 1..steps.len() {
            let mut reduced = steps[start..].to_vec();
            reduced[0].combinator = Combinator::Descendant;
            let locator = Locator::new(steps_to_css(&reduced));
            let matches = locator.query_all(&page.elements);
            let Some(first) = matches.first() else {
                continue;
            };
            let element = (*first).clone();
            if let Some(c) = page.propose(
                locator,
                StrategyKind::Structural,
                &element,
                REDUCED_CONFIDENCE,
                format!("query still matches after dropping {start} leading step(s)"),
            ) {
                out.push(c);
            }
        }
        out
    }

    fn class_candidates(
        tag: Option<&str>,
        classes: &[String],
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        if classes.is_empty() {
            return Vec::new();
        }
        page.elements
            .iter()
            .filter(|e| tag.map_or(true, |t| e.tag_name == t))
            .filter_map(|element| {
                let element_classes = element.classes();
                if element_classes.is_empty() {
                    return None;
                }
                let owned: Vec<String> = element_classes.iter().map(|c| (*c).to_string()).collect();
                let overlap = jaccard(classes, &owned);
                if overlap < MIN_CLASS_OVERLAP {
                    return None;
                }
                page.propose(
                    Locator::by_classes(Some(&element.tag_name), &element_classes),
                    StrategyKind::Structural,
                    element,
                    0.5 + 0.4 * overlap,
                    format!("{:.0}% class overlap", overlap * 100.0),
                )
            })
            .collect()
    }

    fn same_tag_candidates(
        tag: &str,
        parent: Option<&str>,
        depth: Option<usize>,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        page.elements
            .iter()
            .filter(|e| e.tag_name == tag)
            .filter(|e| parent.map_or(true, |p| e.parent_tag() == Some(p)))
            .filter(|e| depth.map_or(true, |d| e.depth().abs_diff(d) <= 1))
            .filter_map(|element| {
                page.propose(
                    element.preferred_locator(),
                    StrategyKind::Structural,
                    element,
                    SAME_TAG_CONFIDENCE,
                    format!("same tag <{tag}> in the same position"),
                )
            })
            .take(MAX_SAME_TAG)
            .collect()
    }
}

fn primary_steps(selector: &Selector) -> &[Step] {
    match selector {
        Selector::Css(query) | Selector::XPath(query) => query.primary(),
        Selector::Nth { base, .. } => primary_steps(base),
        _ => &[],
    }
}

#[async_trait]
impl CandidateStrategy for StructuralStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let hints = ctx.original.hints();
        let previous: Option<&ElementHandle> = ctx.previous_element.as_ref();

        let mut candidates = Self::reduced_candidates(primary_steps(ctx.original.selector()), page);

        let tag = hints
            .tag
            .clone()
            .or_else(|| previous.map(|p| p.tag_name.clone()));
        candidates.extend(Self::class_candidates(tag.as_deref(), &hints.classes, page));

        if let Some(tag) = tag.as_deref() {
            let parent = hints
                .parent_tag
                .clone()
                .or_else(|| previous.and_then(|p| p.parent_tag().map(str::to_string)));
            let depth = previous.map(ElementHandle::depth);
            candidates.extend(Self::same_tag_candidates(tag, parent.as_deref(), depth, page));
        }
        best_per_locator(candidates)
    }
}
