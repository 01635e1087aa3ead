//! End-to-end healing scenarios against an in-memory document.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use proptest::prelude::*;
use sanar::{
    word_overlap, BoundingBox, CodeModificationRequest, CodeModifier, ElementHandle,
    FailureReason, HealingConfig, HealingContext, HealingEngine, HealingMode, HealingResolver,
    MockDocument, NodeSummary, StrategyKind, SuggestionStore,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn submit_button(text: &str) -> ElementHandle {
    ElementHandle::new("submit", "button")
        .with_attr("data-testid", "submit-btn")
        .with_attr("role", "button")
        .with_text(text)
        .with_box(BoundingBox::new(100.0, 200.0, 80.0, 30.0))
        .with_parent(NodeSummary::new("form").with_attr("id", "login"))
}

fn login_page(button_text: &str) -> MockDocument {
    let mut doc = MockDocument::with_elements(vec![
        ElementHandle::new("title", "h1")
            .with_text("Sign in")
            .with_box(BoundingBox::new(100.0, 20.0, 300.0, 40.0)),
        ElementHandle::new("email", "input")
            .with_attr("type", "email")
            .with_attr("name", "user-email")
            .with_box(BoundingBox::new(100.0, 100.0, 200.0, 30.0)),
        submit_button(button_text),
    ]);
    doc.url = "https://app.test/login".into();
    doc.title = "Sign in".into();
    doc
}

#[tokio::test]
async fn scenario_a_attribute_candidate_applied_in_auto_mode() {
    let config = HealingConfig::new()
        .with_mode(HealingMode::Auto)
        .with_threshold(85.0);
    let engine = HealingEngine::new(config).without_store();
    let result = engine
        .attempt_healing(&HealingContext::new("#submit"), &login_page("Submit"))
        .await;

    let semantic = result
        .candidates
        .iter()
        .find(|c| {
            c.candidate.strategy == StrategyKind::Semantic
                && c.candidate.locator.as_str().starts_with("role=button")
        })
        .expect("semantic role candidate");
    assert!(semantic.score >= 80.0, "semantic scored {}", semantic.score);

    let attribute = result
        .candidates
        .iter()
        .find(|c| c.candidate.locator.as_str() == "[data-testid=\"submit-btn\"]")
        .expect("attribute candidate");
    assert_eq!(attribute.candidate.strategy, StrategyKind::Attribute);
    assert!(attribute.score >= 90.0, "attribute scored {}", attribute.score);

    assert!(result.success);
    assert!(result.applied);
    assert_eq!(
        result.applied_locator.as_ref().map(|l| l.as_str()),
        Some("[data-testid=\"submit-btn\"]")
    );
    let env = result.environment.expect("environment snapshot");
    assert_eq!(env.url.as_deref(), Some("https://app.test/login"));
}

#[tokio::test]
async fn scenario_b_suggestion_only_leaves_code_alone() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("login.spec.ts");
    let code = "await page.click('#submit');\n";
    fs::write(&source, code).unwrap();

    let config = HealingConfig::new().with_storage_path(dir.path().join("suggestions.json"));
    let engine = HealingEngine::new(config);
    let ctx = HealingContext::new("#submit").with_source(&source, 1);
    let result = engine.attempt_healing(&ctx, &login_page("Submit")).await;

    assert!(!result.success);
    assert!(!result.applied);
    assert_eq!(result.reason, Some(FailureReason::SuggestionOnly));
    assert!(!result.candidates.is_empty());
    assert_eq!(fs::read_to_string(&source).unwrap(), code);

    let records = SuggestionStore::new(dir.path().join("suggestions.json")).load_suggestions();
    assert_eq!(records.len(), 1);
    assert!(!records[0].applied);
}

#[tokio::test]
async fn scenario_c_partial_text_match() {
    let engine = HealingEngine::new(HealingConfig::new()).without_store();
    let ctx = HealingContext::new("text=\"Submit\"");
    let result = engine.attempt_healing(&ctx, &login_page("Submit Form")).await;

    let text = result
        .candidates
        .iter()
        .find(|c| c.candidate.strategy == StrategyKind::Text)
        .expect("text candidate");
    assert_eq!(text.candidate.locator.as_str(), "text=\"Submit Form\"");
    assert!(word_overlap("Submit", &text.candidate.element.text()) >= 0.6);
    assert!(text.candidate.rationale.contains("partial"));
}

#[tokio::test]
async fn scenario_d_excluded_test_skips_strategies() {
    let doc = login_page("Submit");
    let config = HealingConfig::new()
        .with_mode(HealingMode::Auto)
        .exclude("re:^checkout");
    let engine = HealingEngine::new(config).without_store();
    let ctx = HealingContext::new("#submit").with_test_name("checkout pays");
    let result = engine.attempt_healing(&ctx, &doc).await;

    assert!(!result.success);
    assert_eq!(result.reason, Some(FailureReason::Excluded));
    assert!(result.candidates.is_empty());
    assert_eq!(doc.elements_calls(), 0);
}

#[tokio::test]
async fn healed_suggestion_can_be_applied_to_source() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("login.spec.ts");
    fs::write(
        &source,
        "test('login', async () => {\n  await page.click(\"#submit\");\n});\n",
    )
    .unwrap();

    let store_path = dir.path().join("suggestions.json");
    let engine = HealingEngine::new(
        HealingConfig::new()
            .with_mode(HealingMode::Auto)
            .with_storage_path(&store_path),
    );
    let doc = login_page("Submit");
    let resolver = HealingResolver::new(Arc::new(engine), &doc);
    let ctx = HealingContext::new("#submit").with_source(&source, 2);
    let resolution = resolver.resolve_element(&ctx).await.unwrap();
    assert!(resolution.is_healed());

    let record = SuggestionStore::new(&store_path).recent(1).remove(0);
    let request = CodeModificationRequest::from_record(&record).expect("complete record");
    let outcome = CodeModifier::new().apply_healing_to_code(&request);
    assert!(outcome.success, "{:?}", outcome.error);

    let content = fs::read_to_string(&source).unwrap();
    assert!(content.contains("page.click(\"[data-testid='submit-btn']\")"));
    assert_eq!(content.lines().count(), 3);
}

#[tokio::test]
async fn attempts_are_deterministic() {
    let engine = HealingEngine::new(
        HealingConfig::new().with_strategies(StrategyKind::ALL.to_vec()),
    )
    .without_store();
    let doc = login_page("Submit");
    let ctx = HealingContext::new("form > button.primary");
    let a = engine.attempt_healing(&ctx, &doc).await;
    let b = engine.attempt_healing(&ctx, &doc).await;
    let summary = |r: &sanar::HealingResult| {
        r.candidates
            .iter()
            .map(|c| (c.candidate.locator.to_string(), c.candidate.strategy))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&a), summary(&b));
    assert_eq!(a.score, b.score);
}

proptest! {
    #[test]
    fn auto_mode_applies_iff_threshold_met(threshold in 0.0f64..=100.0) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let engine = HealingEngine::new(
            HealingConfig::new().with_mode(HealingMode::Auto).with_threshold(threshold),
        )
        .without_store();
        let result = runtime.block_on(
            engine.attempt_healing(&HealingContext::new("#submit"), &login_page("Submit")),
        );
        let top = result.candidates.first().map(|c| c.score).unwrap();
        prop_assert_eq!(result.applied, top >= threshold);
        prop_assert_eq!(result.success, result.applied);
        if !result.applied {
            prop_assert_eq!(result.reason, Some(FailureReason::BelowThreshold));
        }
    }

    #[test]
    fn suggestion_only_never_applies(id in "[a-z]{1,10}") {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let engine = HealingEngine::new(HealingConfig::new()).without_store();
        let ctx = HealingContext::new(format!("#{id}"));
        let result = runtime.block_on(engine.attempt_healing(&ctx, &login_page("Submit")));
        prop_assert!(!result.applied);
        prop_assert!(!result.success);
        prop_assert!(result.applied_locator.is_none());
    }
}
