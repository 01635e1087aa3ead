//! Semantic strategy: role and accessible-name matching.

use async_trait::async_trait;

use super::{best_per_locator, CandidateStrategy, PageSnapshot};
use crate::config::StrategyKind;
use crate::context::{Candidate, HealingContext};
use crate::document::ElementHandle;
use crate::locator::{Locator, LocatorHints};
use crate::similarity::word_overlap;

/// Certainty when role and label come straight from the locator
const EXPLICIT_CERTAINTY: f64 = 1.0;
/// Certainty when they are guessed from identifier words
const INFERRED_CERTAINTY: f64 = 0.7;

/// Identifier keyword to ARIA role
const ROLE_KEYWORDS: [(&str, &str); 30] = [
    ("submit", "button"),
    ("btn", "button"),
    ("button", "button"),
    ("save", "button"),
    ("cancel", "button"),
    ("ok", "button"),
    ("confirm", "button"),
    ("send", "button"),
    ("link", "link"),
    ("nav", "link"),
    ("input", "textbox"),
    ("field", "textbox"),
    ("email", "textbox"),
    ("password", "textbox"),
    ("search", "textbox"),
    ("username", "textbox"),
    ("check", "checkbox"),
    ("checkbox", "checkbox"),
    ("radio", "radio"),
    ("select", "combobox"),
    ("dropdown", "combobox"),
    ("img", "img"),
    ("image", "img"),
    ("icon", "img"),
    ("logo", "img"),
    ("heading", "heading"),
    ("title", "heading"),
    ("dialog", "dialog"),
    ("modal", "dialog"),
    ("textbox", "textbox"),
];

/// Words that only name the widget kind and carry no label
const FILLER_WORDS: [&str; 10] = [
    "btn", "button", "input", "field", "link", "icon", "img", "image", "checkbox", "dropdown",
];

/// Attributes that can label an element on their own
const LABEL_ATTRIBUTES: [&str; 3] = ["aria-label", "placeholder", "title"];

/// What the locator was most likely looking for
#[derive(Debug, Clone, PartialEq)]
struct SemanticTarget {
    role: Option<String>,
    label: Option<String>,
    certainty: f64,
}

impl SemanticTarget {
    fn from_hints(hints: &LocatorHints) -> Option<Self> {
        if hints.role.is_some() || hints.label.is_some() {
            return Some(Self {
                role: hints.role.clone(),
                label: hints.label.clone().or_else(|| hints.texts.first().cloned()),
                certainty: EXPLICIT_CERTAINTY,
            });
        }

        let words = hints.identifier_words();
        let role = hints
            .tag
            .as_ref()
            .and_then(|tag| ElementHandle::new("", tag.clone()).role())
            .or_else(|| {
                words.iter().find_map(|w| {
                    ROLE_KEYWORDS
                        .iter()
                        .find(|(k, _)| *k == w.as_str())
                        .map(|(_, role)| (*role).to_string())
                })
            });
        let label_words: Vec<&str> = words
            .iter()
            .map(String::as_str)
            .filter(|w| !FILLER_WORDS.contains(w))
            .collect();
        let label = if label_words.is_empty() {
            hints.texts.first().cloned()
        } else {
            Some(label_words.join(" "))
        };
        if role.is_none() && label.is_none() {
            return None;
        }
        Some(Self {
            role,
            label,
            certainty: INFERRED_CERTAINTY,
        })
    }
}

/// How well an element's name matches the wanted label
fn label_quality(label: &str, name: &str) -> Option<f64> {
    let label = label.trim().to_lowercase();
    let name = name.trim().to_lowercase();
    if label.is_empty() || name.is_empty() {
        return None;
    }
    if label == name {
        return Some(1.0);
    }
    if name.contains(&label) || label.contains(&name) {
        return Some(0.85);
    }
    let overlap = word_overlap(&label, &name);
    (overlap >= 0.5).then_some(0.5 + 0.3 * overlap)
}

/// Role and accessible-name matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemanticStrategy;

impl SemanticStrategy {
    fn role_candidates(
        target: &SemanticTarget,
        role: &str,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let with_role: Vec<&ElementHandle> = page
            .elements
            .iter()
            .filter(|e| e.role().is_some_and(|r| r == role))
            .collect();
        let only_one = with_role.len() == 1;

        with_role
            .into_iter()
            .filter_map(|element| {
                let name = element.accessible_name();
                let (quality, rationale) = match &target.label {
                    Some(label) => {
                        let q = label_quality(label, &name)?;
                        (q, format!("role {role} with name {name:?} matches label {label:?}"))
                    }
                    None if only_one => (0.6, format!("only element with role {role}")),
                    None => (0.4, format!("one of several elements with role {role}")),
                };
                let locator = Locator::by_role(role, Some(&name));
                page.propose(
                    locator,
                    StrategyKind::Semantic,
                    element,
                    target.certainty * quality,
                    rationale,
                )
            })
            .collect()
    }

    fn label_attribute_candidates(
        target: &SemanticTarget,
        label: &str,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for element in &page.elements {
            for attr in LABEL_ATTRIBUTES {
                let Some(value) = element.attr(attr) else {
                    continue;
                };
                let Some(quality) = label_quality(label, value) else {
                    continue;
                };
                if let Some(c) = page.propose(
                    Locator::by_attribute(attr, value),
                    StrategyKind::Semantic,
                    element,
                    target.certainty * quality,
                    format!("{attr} {value:?} matches label {label:?}"),
                ) {
                    out.push(c);
                }
            }
        }
        out
    }
}

#[async_trait]
impl CandidateStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    async fn find_candidates(
        &self,
        ctx: &HealingContext,
        page: &PageSnapshot<'_>,
    ) -> Vec<Candidate> {
        let Some(target) = SemanticTarget::from_hints(ctx.original.hints()) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        if let Some(role) = &target.role {
            candidates.extend(Self::role_candidates(&target, role, page));
        }
        if let Some(label) = &target.label {
            candidates.extend(Self::label_attribute_candidates(&target, label, page));
        }
        best_per_locator(candidates)
    }
}
