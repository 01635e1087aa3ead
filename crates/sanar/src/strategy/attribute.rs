//! Attribute strategy: id, class, name and data-* value matching.

use async_trait::async_trait;

use super::{best_per_locator, CandidateStrategy, PageSnapshot};
use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::document::ElementHandle;
use crate::locator::{Locator, TEST_ID_ATTRIBUTES};
use crate::similarity::{same_pattern, substring_ratio};

/// Minimum substring ratio for a fuzzy value match
const MIN_FUZZY_RATIO: f64 = 0.6;
/// Bonus for test-id attributes
const TEST_ID_BONUS: f64 = 0.1;
/// Attributes that never identify an element
const IGNORED_ATTRIBUTES: [&str; 4] = ["type", "role", "style", "class"];

/// Attribute value matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeStrategy;

/// Confidence that `actual` under `actual_name` is what `wanted` under
/// `wanted_name` became
fn value_match(
    wanted_name: &str,
    wanted: &str,
    actual_name: &str,
    actual: &str,
) -> Option<(f64, String)> {
    if actual == wanted {
        return Some(if actual_name == wanted_name {
            (1.0, format!("{actual_name} still equals {wanted:?}"))
        } else {
            (0.95, format!("{wanted:?} moved from {wanted_name} to {actual_name}"))
        });
    }
    let ratio = substring_ratio(wanted, actual);
    if ratio >= MIN_FUZZY_RATIO {
        return Some((
            0.6 + 0.4 * ratio,
            format!("{actual_name} {actual:?} overlaps {wanted:?} ({:.0}%)", ratio * 100.0),
        ));
    }
    if same_pattern(wanted, actual) {
        return Some((
            0.8,
            format!("{actual_name} {actual:?} has the same shape as {wanted:?}"),
        ));
    }
    None
}

fn locator_for(name: &str, value: &str) -> Locator {
    if name == "id" {
        Locator::by_id(value)
    } else {
        Locator::by_attribute(name, value)
    }
}

impl AttributeStrategy {
    fn value_candidates(
        wanted: &[(String, String)],
        element: &ElementHandle,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (actual_name, actual) in &element.attributes {
            if IGNORED_ATTRIBUTES.contains(&actual_name.as_str()) || actual.trim().is_empty() {
                continue;
            }
            let best = wanted
                .iter()
                .filter_map(|(wanted_name, value)| {
                    value_match(wanted_name, value, actual_name, actual)
                })
                .fold(None::<(f64, String)>, |best, m| match best {
                    Some(b) if b.0 >= m.0 => Some(b),
                    _ => Some(m),
                });
            let Some((mut confidence, rationale)) = best else {
                continue;
            };
            if TEST_ID_ATTRIBUTES.contains(&actual_name.as_str()) {
                confidence = (confidence + TEST_ID_BONUS).min(1.0);
            }
            if let Some(c) = page.propose(
                locator_for(actual_name, actual),
                StrategyKind::Attribute,
                element,
                confidence,
                rationale,
            ) {
                out.push(c);
            }
        }
        out
    }

    fn class_candidates(
        wanted: &[String],
        element: &ElementHandle,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for class in element.classes() {
            for hint in wanted {
                let (confidence, rationale) = if class == hint.as_str() {
                    (0.7, format!("class {class:?} still present"))
                } else {
                    let ratio = substring_ratio(hint, class);
                    if ratio < MIN_FUZZY_RATIO {
                        continue;
                    }
                    (
                        0.5 + 0.3 * ratio,
                        format!("class {class:?} overlaps {hint:?} ({:.0}%)", ratio * 100.0),
                    )
                };
                if let Some(c) = page.propose(
                    Locator::by_classes(None, &[class]),
                    StrategyKind::Attribute,
                    element,
                    confidence,
                    rationale,
                ) {
                    out.push(c);
                }
            }
        }
        out
    }
}

#[async_trait]
impl CandidateStrategy for AttributeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Attribute
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let hints = ctx.original.hints();
        let wanted = hints.identifier_values();
        if wanted.is_empty() && hints.classes.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for element in &page.elements {
            if !wanted.is_empty() {
                candidates.extend(Self::value_candidates(&wanted, element, page));
            }
            if !hints.classes.is_empty() {
                candidates.extend(Self::class_candidates(&hints.classes, element, page));
            }
        }
        best_per_locator(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::document::MockDocument;

    async fn run(locator: &str, elements: Vec<ElementHandle>) -> Vec<Candidate> {
        let doc = MockDocument::new();
        let page = PageSnapshot::new(elements, &doc);
        AttributeStrategy
            .find_candidates(&HealingContext::new(locator), &page)
            .await
    }

    #[test]
    fn test_value_match_levels() {
        assert_eq!(value_match("id", "go", "id", "go").map(|m| m.0), Some(1.0));
        assert_eq!(value_match("id", "go", "name", "go").map(|m| m.0), Some(0.95));
        let fuzzy = value_match("id", "submit", "data-testid", "submit-btn").unwrap().0;
        assert!((fuzzy - 0.84).abs() < 1e-9);
        assert_eq!(
            value_match("id", "item-123", "id", "item-456").map(|m| m.0),
            Some(0.8)
        );
        assert_eq!(value_match("id", "header", "id", "footer"), None);
    }

    #[tokio::test]
    async fn test_test_id_fuzzy_match_gets_bonus() {
        let candidates = run("#submit", vec![submit_button()]).await;
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.locator.as_str(), "[data-testid=\"submit-btn\"]");
        assert!((c.confidence - 0.94).abs() < 1e-9);
        assert!(c.unique);
    }

    #[tokio::test]
    async fn test_role_attribute_ignored() {
        let candidates = run("[data-testid=\"button\"]", vec![submit_button()]).await;
        assert!(candidates.iter().all(|c| !c.locator.as_str().contains("role")));
    }

    #[tokio::test]
    async fn test_generated_id_pattern() {
        let row = ElementHandle::new("r", "tr").with_attr("id", "row-1042");
        let candidates = run("#row-17", vec![row]).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].locator.as_str(), "#row-1042");
        assert!((candidates[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_class_token_matches() {
        let el = ElementHandle::new("b", "button").with_attr("class", "btn-primary large");
        let candidates = run(".btn-primary", vec![el]).await;
        let c = candidates
            .iter()
            .find(|c| c.locator.as_str() == ".btn-primary")
            .unwrap();
        assert!((c.confidence - 0.7).abs() < f64::EPSILON);
    }
}
