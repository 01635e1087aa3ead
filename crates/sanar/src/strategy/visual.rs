//! Visual strategy: position, size and computed-style matching.
//!
//! With a previously matched element as baseline, every visible element is
//! compared on tag, style, position and size. Without one, visible
//! interactive elements are proposed in document order at low confidence.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{best_per_locator, CandidateStrategy, PageSnapshot};
use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::document::ElementHandle;
use crate::locator::BoundingBox;

/// Centre distance (px) for a pure-position match
const POSITION_RADIUS: f32 = 100.0;
/// Relative width/height tolerance for a pure-size match
const SIZE_TOLERANCE: f32 = 0.2;
/// Minimum composite similarity
const MIN_COMPOSITE: f64 = 0.5;
/// Candidates proposed without a baseline
const MAX_FALLBACK: usize = 5;

/// Position, size and style matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualStrategy;

/// Share of baseline style properties with the same value; neutral when
/// the baseline has none
fn style_similarity(
    baseline: &BTreeMap<String, String>,
    actual: &BTreeMap<String, String>,
) -> f64 {
    if baseline.is_empty() {
        return 0.5;
    }
    let same = baseline
        .iter()
        .filter(|(k, v)| actual.get(*k) == Some(*v))
        .count();
    same as f64 / baseline.len() as f64
}

fn position_similarity(distance: f32) -> f64 {
    1.0 / (1.0 + f64::from(distance) / f64::from(POSITION_RADIUS))
}

fn size_similarity(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (x, y) = (f64::from(a.area()), f64::from(b.area()));
    let max = x.max(y);
    if max <= 0.0 {
        1.0
    } else {
        1.0 - (x - y).abs() / max
    }
}

fn within_size_tolerance(baseline: &BoundingBox, actual: &BoundingBox) -> bool {
    let close = |base: f32, value: f32| {
        if base <= 0.0 {
            value <= 0.0
        } else {
            (value - base).abs() / base <= SIZE_TOLERANCE
        }
    };
    close(baseline.width, actual.width) && close(baseline.height, actual.height)
}

impl VisualStrategy {
    async fn against_baseline(
        previous: &ElementHandle,
        baseline_box: &BoundingBox,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let baseline_center = baseline_box.center();
        let mut out = Vec::new();

        for element in page.elements.iter().filter(|e| e.is_visible()) {
            let Some(bbox) = element.bounding_box else {
                continue;
            };
            let style = if previous.computed_style.is_empty() {
                BTreeMap::new()
            } else {
                page.document
                    .computed_style(element)
                    .await
                    .unwrap_or_else(|_| element.computed_style.clone())
            };

            let distance = bbox.center().distance_to(&baseline_center);
            let tag = if element.tag_name == previous.tag_name { 1.0 } else { 0.0 };
            let composite = 0.2 * tag
                + 0.4 * style_similarity(&previous.computed_style, &style)
                + 0.2 * position_similarity(distance)
                + 0.2 * size_similarity(baseline_box, &bbox);

            let mut options: Vec<(f64, String)> = Vec::new();
            if composite >= MIN_COMPOSITE {
                options.push((
                    composite,
                    format!("visual similarity {:.0}%", composite * 100.0),
                ));
            }
            if distance <= POSITION_RADIUS {
                options.push((
                    0.9 - 0.4 * f64::from(distance / POSITION_RADIUS),
                    format!("{distance:.0}px from the previous position"),
                ));
            }
            if within_size_tolerance(baseline_box, &bbox) {
                options.push((0.6, "same size as the previous element".to_string()));
            }
            let Some((confidence, rationale)) = options
                .into_iter()
                .reduce(|best, o| if o.0 > best.0 { o } else { best })
            else {
                continue;
            };

            if let Some(c) = page.propose(
                element.preferred_locator(),
                StrategyKind::Visual,
                element,
                confidence,
                rationale,
            ) {
                out.push(c);
            }
        }
        out
    }

    fn without_baseline(tag_hint: Option<&str>, page: &PageSnapshot<'_>) -> Vec<Candidate> {
        let mut interactive: Vec<&ElementHandle> = page
            .elements
            .iter()
            .filter(|e| e.is_visible() && e.is_interactive())
            .collect();
        // Stable: document order within each group
        interactive.sort_by_key(|e| tag_hint.map_or(false, |t| e.tag_name != t));

        interactive
            .into_iter()
            .take(MAX_FALLBACK)
            .enumerate()
            .filter_map(|(rank, element)| {
                let confidence = (0.5 - 0.05 * rank as f64).max(0.2);
                page.propose(
                    element.preferred_locator(),
                    StrategyKind::Visual,
                    element,
                    confidence,
                    format!("visible interactive element #{}", rank + 1),
                )
            })
            .collect()
    }
}

#[async_trait]
impl CandidateStrategy for VisualStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Visual
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let candidates = match ctx
            .previous_element
            .as_ref()
            .and_then(|p| p.bounding_box.map(|b| (p, b)))
        {
            Some((previous, bbox)) => Self::against_baseline(previous, &bbox, page).await,
            None => Self::without_baseline(ctx.original.hints().tag.as_deref(), page),
        };
        best_per_locator(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::document::MockDocument;

    async fn run(ctx: HealingContext, elements: Vec<ElementHandle>) -> Vec<Candidate> {
        let doc = MockDocument::new();
        let page = PageSnapshot::new(elements, &doc);
        VisualStrategy.find_candidates(&ctx, &page).await
    }

    #[test]
    fn test_similarity_helpers() {
        assert!((position_similarity(0.0) - 1.0).abs() < f64::EPSILON);
        assert!((position_similarity(100.0) - 0.5).abs() < 1e-9);
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        assert!((size_similarity(&a, &b) - 0.5).abs() < 1e-9);
        assert!(!within_size_tolerance(&a, &b));
        assert!(within_size_tolerance(&a, &BoundingBox::new(5.0, 5.0, 11.0, 9.0)));
    }

    #[test]
    fn test_style_similarity() {
        let mut base = BTreeMap::new();
        base.insert("color".to_string(), "red".to_string());
        base.insert("display".to_string(), "block".to_string());
        let mut actual = BTreeMap::new();
        actual.insert("color".to_string(), "red".to_string());
        assert!((style_similarity(&base, &actual) - 0.5).abs() < f64::EPSILON);
        assert!((style_similarity(&BTreeMap::new(), &actual) - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_same_position_scores_high() {
        let previous = submit_button();
        let moved = submit_button()
            .with_attr("data-testid", "send")
            .with_box(BoundingBox::new(110.0, 200.0, 80.0, 30.0));
        let ctx = HealingContext::new("#submit").with_previous_element(previous);
        let candidates = run(ctx, vec![moved, heading()]).await;
        let best = candidates
            .iter()
            .find(|c| c.element.handle == "submit")
            .unwrap();
        // 10px away: 0.9 - 0.4 * 0.1
        assert!((best.confidence - 0.86).abs() < 1e-6);
        assert!(candidates.iter().all(|c| c.element.handle != "title"));
    }

    #[tokio::test]
    async fn test_fallback_orders_by_tag_hint() {
        let link = ElementHandle::new("home", "a")
            .with_attr("href", "/")
            .with_text("Home")
            .with_box(BoundingBox::new(0.0, 0.0, 50.0, 20.0));
        let ctx = HealingContext::new("button.gone");
        let candidates = run(ctx, vec![link, submit_button(), heading()]).await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].element.handle, "submit");
        assert!((candidates[0].confidence - 0.5).abs() < f64::EPSILON);
        assert!((candidates[1].confidence - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hidden_elements_skipped() {
        let ctx = HealingContext::new("#x");
        let candidates = run(ctx, vec![submit_button().hidden()]).await;
        assert!(candidates.is_empty());
    }
}
