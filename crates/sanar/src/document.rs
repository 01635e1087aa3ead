//! Document abstraction: what healing needs from the automation layer.
//!
//! The engine never drives a browser itself. It asks a [`HealingDocument`]
//! for the current element set, page metadata and (optionally) a
//! screenshot, and it re-resolves healed locators through the same trait.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::locator::{quote, BoundingBox, Locator, Point, TEST_ID_ATTRIBUTES};
use crate::result::{HealError, HealResult, ResolveError};
use crate::similarity::normalize_whitespace;

/// Tags whose text is considered a container rather than a label
const CONTAINER_TAGS: [&str; 14] = [
    "div", "section", "article", "form", "ul", "ol", "table", "tbody", "nav", "header", "footer",
    "main", "body", "html",
];

/// Longest accessible name or text emitted into a generated locator
const MAX_LOCATOR_TEXT: usize = 60;

/// Tag and attributes of an ancestor node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// Tag name
    pub tag: String,
    /// Attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NodeSummary {
    /// Create a summary for a tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Snapshot of one element in the live document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementHandle {
    /// Opaque handle assigned by the automation layer
    pub handle: String,
    /// Element tag name (lowercase)
    pub tag_name: String,
    /// DOM attributes, including `id` and `class`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Element text content
    pub text_content: Option<String>,
    /// Bounding box if laid out
    pub bounding_box: Option<BoundingBox>,
    /// Rendered visibility
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Not disabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ancestor chain, root first, parent last
    #[serde(default)]
    pub ancestors: Vec<NodeSummary>,
    /// Position in document order
    #[serde(default)]
    pub dom_index: usize,
    /// Computed style properties
    #[serde(default)]
    pub computed_style: BTreeMap<String, String>,
}

const fn default_true() -> bool {
    true
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(handle: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            tag_name: tag_name.into().to_lowercase(),
            attributes: BTreeMap::new(),
            text_content: None,
            bounding_box: None,
            visible: true,
            enabled: true,
            ancestors: Vec::new(),
            dom_index: 0,
            computed_style: BTreeMap::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Set the bounding box
    #[must_use]
    pub const fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }

    /// Append an ancestor (call root first)
    #[must_use]
    pub fn with_parent(mut self, node: NodeSummary) -> Self {
        self.ancestors.push(node);
        self
    }

    /// Set a computed style property
    #[must_use]
    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.computed_style.insert(property.into(), value.into());
        self
    }

    /// Set the document-order index
    #[must_use]
    pub const fn at_index(mut self, index: usize) -> Self {
        self.dom_index = index;
        self
    }

    /// Mark as not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark as disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// DOM id
    #[must_use]
    pub fn dom_id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    /// Class tokens
    #[must_use]
    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Whitespace-normalized text content
    #[must_use]
    pub fn text(&self) -> String {
        self.text_content
            .as_deref()
            .map(normalize_whitespace)
            .unwrap_or_default()
    }

    /// Check if element is visible
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
            && self
                .bounding_box
                .map_or(true, |b| b.width > 0.0 && b.height > 0.0)
    }

    /// Center of the bounding box
    #[must_use]
    pub fn center(&self) -> Option<Point> {
        self.bounding_box.as_ref().map(BoundingBox::center)
    }

    /// Explicit `role` attribute, else the implicit ARIA role of the tag
    #[must_use]
    pub fn role(&self) -> Option<String> {
        if let Some(role) = self.attr("role").filter(|r| !r.is_empty()) {
            return Some(role.to_lowercase());
        }
        let implicit = match self.tag_name.as_str() {
            "button" => "button",
            "a" if self.attr("href").is_some() => "link",
            "select" => "combobox",
            "textarea" => "textbox",
            "img" => "img",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "dialog" => "dialog",
            "nav" => "navigation",
            "li" => "listitem",
            "ul" | "ol" => "list",
            "table" => "table",
            "input" => match self.attr("type").unwrap_or("text") {
                "button" | "submit" | "reset" | "image" => "button",
                "checkbox" => "checkbox",
                "radio" => "radio",
                "range" => "slider",
                "search" => "searchbox",
                "hidden" => return None,
                _ => "textbox",
            },
            _ => return None,
        };
        Some(implicit.to_string())
    }

    /// Accessible name: aria-label, text, title, placeholder, alt, value
    #[must_use]
    pub fn accessible_name(&self) -> String {
        let text = self.text();
        let candidates = [
            self.attr("aria-label").map(str::to_string),
            Some(text).filter(|t| !t.is_empty()),
            self.attr("title").map(str::to_string),
            self.attr("placeholder").map(str::to_string),
            self.attr("alt").map(str::to_string),
            self.attr("value").map(str::to_string),
        ];
        candidates
            .into_iter()
            .flatten()
            .map(|s| normalize_whitespace(&s))
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }

    /// Whether users can act on this element
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        matches!(
            self.tag_name.as_str(),
            "button" | "a" | "input" | "select" | "textarea" | "summary" | "option"
        ) || matches!(
            self.role().as_deref(),
            Some(
                "button"
                    | "link"
                    | "checkbox"
                    | "radio"
                    | "tab"
                    | "menuitem"
                    | "switch"
                    | "textbox"
                    | "combobox"
            )
        ) || self.attr("onclick").is_some()
            || self
                .attr("tabindex")
                .is_some_and(|t| t.parse::<i32>().is_ok_and(|n| n >= 0))
    }

    /// Whether the element's text labels it (not a layout container)
    #[must_use]
    pub fn is_text_leaf(&self) -> bool {
        !CONTAINER_TAGS.contains(&self.tag_name.as_str()) || self.attr("role").is_some()
    }

    /// Tag of the direct parent
    #[must_use]
    pub fn parent_tag(&self) -> Option<&str> {
        self.ancestors.last().map(|n| n.tag.as_str())
    }

    /// Nesting depth (number of ancestors)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Test id attribute and value, if any
    #[must_use]
    pub fn test_id(&self) -> Option<(&'static str, &str)> {
        TEST_ID_ATTRIBUTES
            .iter()
            .find_map(|name| self.attr(name).map(|v| (*name, v)))
    }

    /// Most stable locator that describes this element.
    ///
    /// Preference: test id, DOM id, role with name, `name` attribute,
    /// aria-label, exact text, tag with classes, bare tag. Uniqueness is
    /// not guaranteed.
    #[must_use]
    pub fn preferred_locator(&self) -> Locator {
        if let Some((name, value)) = self.test_id() {
            return Locator::by_attribute(name, value);
        }
        if let Some(id) = self.dom_id() {
            return Locator::by_id(id);
        }
        let name = self.accessible_name();
        if let Some(role) = self.role() {
            if !name.is_empty() && name.chars().count() <= MAX_LOCATOR_TEXT {
                return Locator::by_role(&role, Some(&name));
            }
        }
        if let Some(value) = self.attr("name") {
            return Locator::new(format!("{}[name={}]", self.tag_name, quote(value)));
        }
        if let Some(label) = self.attr("aria-label") {
            return Locator::by_attribute("aria-label", label);
        }
        let text = self.text();
        if self.is_text_leaf() && !text.is_empty() && text.chars().count() <= MAX_LOCATOR_TEXT {
            return Locator::by_text(&text);
        }
        let classes = self.classes();
        if classes.is_empty() {
            Locator::new(self.tag_name.clone())
        } else {
            Locator::by_classes(Some(&self.tag_name), &classes)
        }
    }
}

/// Screenshot data
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }

    /// Base64 encoding of the image bytes
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// What healing needs from the live document.
///
/// # Implementations
///
/// - `MockDocument` - In-memory element set for unit testing
/// - Browser bridges implement this over their own driver
#[async_trait]
pub trait HealingDocument: Send + Sync {
    /// Current element set in document order
    async fn elements(&self) -> HealResult<Vec<ElementHandle>>;

    /// Resolve a locator to exactly one element
    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, ResolveError>;

    /// Current URL
    async fn url(&self) -> HealResult<String>;

    /// Page title
    async fn title(&self) -> HealResult<String>;

    /// Take screenshot
    async fn screenshot(&self) -> HealResult<Screenshot>;

    /// Computed style of an element
    async fn computed_style(
        &self,
        element: &ElementHandle,
    ) -> HealResult<BTreeMap<String, String>> {
        Ok(element.computed_style.clone())
    }
}

/// Mock document for unit testing
#[derive(Debug, Default)]
pub struct MockDocument {
    /// Current URL
    pub url: String,
    /// Page title
    pub title: String,
    /// Mock elements
    pub elements: Vec<ElementHandle>,
    /// Screenshot data
    pub screenshot_data: Option<Screenshot>,
    /// Make `elements()` fail
    pub unavailable: bool,
    /// Handles that report as detached when resolved
    pub detached: BTreeSet<String>,
    /// Forced resolution errors per locator text
    pub resolve_errors: BTreeMap<String, ResolveError>,
    elements_calls: AtomicUsize,
    call_history: Mutex<Vec<String>>,
}

impl MockDocument {
    /// Create new mock document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock document holding `elements`, re-indexed in order
    #[must_use]
    pub fn with_elements(elements: Vec<ElementHandle>) -> Self {
        let mut doc = Self::new();
        for element in elements {
            doc.add_element(element);
        }
        doc
    }

    /// Add a mock element; its `dom_index` is set to its position
    pub fn add_element(&mut self, mut element: ElementHandle) {
        element.dom_index = self.elements.len();
        self.elements.push(element);
    }

    /// Set mock screenshot
    pub fn set_screenshot(&mut self, screenshot: Screenshot) {
        self.screenshot_data = Some(screenshot);
    }

    /// Force `resolve` to fail for a locator
    pub fn fail_resolve(&mut self, locator: impl Into<String>, error: ResolveError) {
        self.resolve_errors.insert(locator.into(), error);
    }

    /// Number of `elements()` calls so far
    #[must_use]
    pub fn elements_calls(&self) -> usize {
        self.elements_calls.load(Ordering::SeqCst)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(method))
    }

    fn record(&self, call: String) {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl HealingDocument for MockDocument {
    async fn elements(&self) -> HealResult<Vec<ElementHandle>> {
        self.elements_calls.fetch_add(1, Ordering::SeqCst);
        self.record("elements".to_string());
        if self.unavailable {
            return Err(HealError::document("Document is not available"));
        }
        Ok(self.elements.clone())
    }

    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, ResolveError> {
        self.record(format!("resolve:{locator}"));
        if let Some(error) = self.resolve_errors.get(locator.as_str()) {
            return Err(error.clone());
        }
        let matches = locator.query_all(&self.elements);
        match matches.as_slice() {
            [] => Err(ResolveError::NotFound {
                locator: locator.to_string(),
            }),
            [one] if self.detached.contains(&one.handle) => Err(ResolveError::Detached {
                locator: locator.to_string(),
            }),
            [one] => Ok((*one).clone()),
            many => Err(ResolveError::MultipleMatches {
                locator: locator.to_string(),
                count: many.len(),
            }),
        }
    }

    async fn url(&self) -> HealResult<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> HealResult<String> {
        Ok(self.title.clone())
    }

    async fn screenshot(&self) -> HealResult<Screenshot> {
        self.screenshot_data
            .clone()
            .ok_or_else(|| HealError::Screenshot {
                message: "No mock screenshot set".to_string(),
            })
    }
}
