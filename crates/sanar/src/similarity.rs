//! Text similarity helpers shared by the strategies and the scorer.
//!
//! All comparisons are case-insensitive. Ratios are in `[0.0, 1.0]`.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("uuid pattern is a valid regex")
    })
}

#[allow(clippy::expect_used)]
fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digit pattern is a valid regex"))
}

/// Split text into lowercase alphanumeric tokens, preserving order.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Collapse runs of whitespace and trim.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Share of the original's words that also appear in the candidate.
///
/// Measured against the original so that `"Submit"` vs `"Submit Form"` is a
/// full overlap: every word the test asked for is still present.
#[must_use]
pub fn word_overlap(original: &str, candidate: &str) -> f64 {
    let orig: BTreeSet<String> = tokenize(original).into_iter().collect();
    if orig.is_empty() {
        return 0.0;
    }
    let cand: BTreeSet<String> = tokenize(candidate).into_iter().collect();
    let shared = orig.intersection(&cand).count();
    shared as f64 / orig.len() as f64
}

/// Jaccard index of two token sets.
#[must_use]
pub fn jaccard<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    let a: BTreeSet<String> = a.iter().map(|s| s.as_ref().to_lowercase()).collect();
    let b: BTreeSet<String> = b.iter().map(|s| s.as_ref().to_lowercase()).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Length ratio of the shorter string to the longer one when one contains
/// the other, else `0.0`.
#[must_use]
pub fn substring_ratio(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if long.contains(&short) {
        short.chars().count() as f64 / long.chars().count() as f64
    } else {
        0.0
    }
}

/// Replace UUIDs with `{uuid}` and digit runs with `{n}`.
#[must_use]
pub fn normalize_pattern(value: &str) -> String {
    let without_uuids = uuid_regex().replace_all(value, "{uuid}");
    digits_regex()
        .replace_all(&without_uuids, "{n}")
        .to_lowercase()
}

/// True when two different values share the same generated-id shape,
/// e.g. `item-123` and `item-456`.
#[must_use]
pub fn same_pattern(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return false;
    }
    let pa = normalize_pattern(a);
    pa != a.to_lowercase() && pa == normalize_pattern(b)
}

/// Share of the original locator's tokens present in the candidate locator.
#[must_use]
pub fn token_similarity(original: &str, candidate: &str) -> f64 {
    word_overlap(original, candidate)
}
