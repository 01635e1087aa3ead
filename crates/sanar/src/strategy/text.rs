//! Text strategy: visible text matching.

use async_trait::async_trait;

use super::{best_per_locator, CandidateStrategy, PageSnapshot};
use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::locator::Locator;
use crate::similarity::word_overlap;

/// Minimum share of the original's words for a partial match
const MIN_WORD_OVERLAP: f64 = 0.6;

/// Texts longer than this are paragraphs, not labels
const MAX_TEXT_LEN: usize = 200;

/// Visible text matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStrategy;

/// Confidence and rationale for one element text against one wanted text
fn text_match(wanted: &str, actual: &str) -> Option<(f64, String)> {
    if actual == wanted {
        return Some((1.0, "exact text match".to_string()));
    }
    let wanted_lower = wanted.to_lowercase();
    let actual_lower = actual.to_lowercase();
    if wanted_lower == actual_lower {
        return Some((0.95, "text matches ignoring case".to_string()));
    }
    let overlap = word_overlap(wanted, actual);
    if overlap >= MIN_WORD_OVERLAP {
        return Some((
            0.5 + 0.4 * overlap,
            format!("partial text match, {:.0}% word overlap", overlap * 100.0),
        ));
    }
    None
}

#[async_trait]
impl CandidateStrategy for TextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Text
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let wanted: Vec<&str> = ctx
            .original
            .hints()
            .texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for element in page.elements.iter().filter(|e| e.is_text_leaf()) {
            let actual = element.text();
            if actual.is_empty() || actual.chars().count() > MAX_TEXT_LEN {
                continue;
            }
            for text in &wanted {
                let Some((confidence, rationale)) = text_match(text, &actual) else {
                    continue;
                };
                if let Some(c) = page.propose(
                    Locator::by_text(&actual),
                    StrategyKind::Text,
                    element,
                    confidence,
                    format!("{rationale}: {actual:?}"),
                ) {
                    candidates.push(c);
                }
            }
        }
        best_per_locator(candidates)
    }
}
