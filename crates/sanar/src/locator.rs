//! Locator model: the raw query string plus a structured form parsed once.
//!
//! A [`Locator`] is captured when a test builds its query. Parsing happens at
//! capture time, so strategies read [`LocatorHints`] instead of re-matching
//! the raw text.
//!
//! # Supported forms
//!
//! - CSS: `button.primary`, `#id`, `[data-testid="x"]`, `form > button`,
//!   `button:has-text("Go")`
//! - Role: `role=button[name="Submit"]`, `getByRole('button', { name: 'Submit' })`
//! - Text: `text="Submit"` (exact), `text=Submit` (substring), `getByText('x')`
//! - Test id / label / placeholder: `getByTestId('x')`, `getByLabel('x')`,
//!   `getByPlaceholder('x')`
//! - XPath: `//button[@id='x']`, `xpath=//a[text()='Home']`
//! - Index suffix: `li.item >> nth=2`

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::document::{ElementHandle, NodeSummary};
use crate::similarity::normalize_whitespace;

/// Attributes that carry test identifiers
pub const TEST_ID_ATTRIBUTES: [&str; 4] = ["data-testid", "data-test", "data-cy", "data-qa"];

/// A point in 2D space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Bounding box for an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Area in square pixels
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Check if a point is inside this bounding box
    #[must_use]
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// How two compound selectors relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Any ancestor (`a b`, `//`)
    Descendant,
    /// Direct parent (`a > b`, `/`)
    Child,
}

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[attr]`
    Exists,
    /// `[attr="v"]`
    Equals,
    /// `[attr*="v"]`
    Contains,
    /// `[attr^="v"]`
    Prefix,
    /// `[attr$="v"]`
    Suffix,
    /// `[attr~="v"]`
    Word,
}

/// One attribute condition of a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatcher {
    /// Attribute name
    pub name: String,
    /// Operator
    pub op: AttrOp,
    /// Expected value (empty for `Exists`)
    pub value: String,
}

impl AttrMatcher {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Contains => actual.contains(&self.value),
            AttrOp::Prefix => actual.starts_with(&self.value),
            AttrOp::Suffix => actual.ends_with(&self.value),
            AttrOp::Word => actual.split_whitespace().any(|w| w == self.value),
        }
    }
}

/// Text condition of a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// Text to look for
    pub value: String,
    /// Exact (whitespace-normalized) equality instead of case-insensitive containment
    pub exact: bool,
}

impl TextMatch {
    fn matches(&self, text: Option<&str>) -> bool {
        let Some(text) = text else {
            return false;
        };
        let text = normalize_whitespace(text);
        if self.exact {
            text == normalize_whitespace(&self.value)
        } else {
            text.to_lowercase()
                .contains(&normalize_whitespace(&self.value).to_lowercase())
        }
    }
}

/// A compound selector: everything between two combinators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Tag name (`None` or `*` matches any)
    pub tag: Option<String>,
    /// Attribute conditions; `#id` and `.class` are folded in here
    pub attrs: Vec<AttrMatcher>,
    /// Text condition from `:has-text()` or XPath `text()`
    pub text: Option<TextMatch>,
}

impl Compound {
    /// DOM id required by this compound
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == "id" && a.op == AttrOp::Equals)
            .map(|a| a.value.as_str())
    }

    /// Classes required by this compound
    #[must_use]
    pub fn classes(&self) -> Vec<&str> {
        self.attrs
            .iter()
            .filter(|a| a.name == "class" && a.op == AttrOp::Word)
            .map(|a| a.value.as_str())
            .collect()
    }

    fn matches_parts(
        &self,
        tag: &str,
        attr: impl Fn(&str) -> Option<String>,
        text: Option<&str>,
    ) -> bool {
        if let Some(expected) = &self.tag {
            if expected != "*" && !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self
            .attrs
            .iter()
            .all(|a| a.matches(attr(&a.name).as_deref()))
        {
            return false;
        }
        self.text.as_ref().map_or(true, |t| t.matches(text))
    }

    fn matches_element(&self, element: &ElementHandle) -> bool {
        self.matches_parts(
            &element.tag_name,
            |name| element.attr(name).map(str::to_string),
            element.text_content.as_deref(),
        )
    }

    fn matches_node(&self, node: &NodeSummary) -> bool {
        self.matches_parts(&node.tag, |name| node.attr(name).map(str::to_string), None)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = self.tag.clone().unwrap_or_default();
        for attr in &self.attrs {
            match (attr.name.as_str(), attr.op) {
                ("id", AttrOp::Equals) if is_css_ident(&attr.value) => {
                    out.push('#');
                    out.push_str(&attr.value);
                }
                ("class", AttrOp::Word) if is_css_ident(&attr.value) => {
                    out.push('.');
                    out.push_str(&attr.value);
                }
                (name, AttrOp::Exists) => out.push_str(&format!("[{name}]")),
                (name, op) => {
                    let op = match op {
                        AttrOp::Contains => "*=",
                        AttrOp::Prefix => "^=",
                        AttrOp::Suffix => "$=",
                        AttrOp::Word => "~=",
                        AttrOp::Equals | AttrOp::Exists => "=",
                    };
                    out.push_str(&format!("[{name}{op}{}]", quote(&attr.value)));
                }
            }
        }
        if let Some(text) = &self.text {
            let pseudo = if text.exact { "text-is" } else { "has-text" };
            out.push_str(&format!(":{pseudo}({})", quote(&text.value)));
        }
        if out.is_empty() {
            out.push('*');
        }
        f.write_str(&out)
    }
}

/// One step of a parsed structural query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Relation to the previous step
    pub combinator: Combinator,
    /// Conditions on this node
    pub compound: Compound,
}

/// Render a chain of steps as CSS
#[must_use]
pub fn steps_to_css(steps: &[Step]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            out.push_str(match step.combinator {
                Combinator::Child => " > ",
                Combinator::Descendant => " ",
            });
        }
        out.push_str(&step.compound.to_string());
    }
    out
}

/// Parsed CSS or XPath query (comma alternatives, each a chain of steps)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralQuery {
    /// Source text
    pub source: String,
    /// Alternatives; any may match
    pub alternatives: Vec<Vec<Step>>,
}

impl StructuralQuery {
    /// Parse a CSS selector list
    #[must_use]
    pub fn css(source: &str) -> Self {
        let alternatives = split_top_level(source, ',')
            .iter()
            .map(|alt| parse_css_chain(alt))
            .filter(|chain| !chain.is_empty())
            .collect();
        Self {
            source: source.to_string(),
            alternatives,
        }
    }

    /// Parse a (subset of) XPath
    #[must_use]
    pub fn xpath(source: &str) -> Self {
        let chain = parse_xpath_chain(source);
        Self {
            source: source.to_string(),
            alternatives: if chain.is_empty() {
                Vec::new()
            } else {
                vec![chain]
            },
        }
    }

    /// Steps of the first alternative
    #[must_use]
    pub fn primary(&self) -> &[Step] {
        self.alternatives.first().map_or(&[], Vec::as_slice)
    }

    /// Check the query against one element and its ancestors
    #[must_use]
    pub fn matches(&self, element: &ElementHandle) -> bool {
        self.alternatives.iter().any(|steps| {
            let Some((last, rest)) = steps.split_last() else {
                return false;
            };
            last.compound.matches_element(element)
                && match_ancestors(rest, &element.ancestors, last.combinator)
        })
    }
}

fn match_ancestors(steps: &[Step], ancestors: &[NodeSummary], combinator: Combinator) -> bool {
    let Some((last, rest)) = steps.split_last() else {
        return true;
    };
    match combinator {
        Combinator::Child => {
            let Some((parent, above)) = ancestors.split_last() else {
                return false;
            };
            last.compound.matches_node(parent) && match_ancestors(rest, above, last.combinator)
        }
        Combinator::Descendant => (0..ancestors.len()).rev().any(|i| {
            last.compound.matches_node(&ancestors[i])
                && match_ancestors(rest, &ancestors[..i], last.combinator)
        }),
    }
}

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(StructuralQuery),
    /// XPath selector
    XPath(StructuralQuery),
    /// Text content selector
    Text {
        /// Text to match
        text: String,
        /// Exact match (quoted form) vs case-insensitive substring
        exact: bool,
    },
    /// ARIA role selector with optional accessible name
    Role {
        /// Role name
        role: String,
        /// Accessible name
        name: Option<String>,
    },
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// Accessible label selector
    Label(String),
    /// Placeholder selector
    Placeholder(String),
    /// Pick the n-th match of another selector
    Nth {
        /// Base selector
        base: Box<Selector>,
        /// Zero-based index
        index: usize,
    },
}

impl Selector {
    /// Parse the textual form of a locator
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();

        if let Some((base, index)) = split_nth(s) {
            return Self::Nth {
                base: Box::new(Self::parse(base)),
                index,
            };
        }
        if let Some(rest) = s.strip_prefix("xpath=") {
            return Self::XPath(StructuralQuery::xpath(rest.trim()));
        }
        if s.starts_with('/') || s.starts_with("(/") {
            return Self::XPath(StructuralQuery::xpath(s));
        }
        if let Some(rest) = s.strip_prefix("role=") {
            return parse_role_engine(rest);
        }
        if let Some(rest) = s.strip_prefix("text=") {
            let rest = rest.trim();
            return match unquote(rest) {
                Some(text) => Self::Text { text, exact: true },
                None => Self::Text {
                    text: rest.to_string(),
                    exact: false,
                },
            };
        }
        if let Some(rest) = s.strip_prefix("data-testid=") {
            return Self::TestId(unquote(rest).unwrap_or_else(|| rest.to_string()));
        }
        if let Some(selector) = parse_get_by(s) {
            return selector;
        }
        if let Some(rest) = s.strip_prefix("css=") {
            return Self::Css(StructuralQuery::css(rest.trim()));
        }
        Self::Css(StructuralQuery::css(s))
    }

    /// Check whether an element satisfies this selector (ignores `nth`)
    #[must_use]
    pub fn matches(&self, element: &ElementHandle) -> bool {
        match self {
            Self::Css(query) | Self::XPath(query) => query.matches(element),
            Self::Text { text, exact } => {
                element.is_text_leaf()
                    && TextMatch {
                        value: text.clone(),
                        exact: *exact,
                    }
                    .matches(element.text_content.as_deref())
            }
            Self::Role { role, name } => {
                element.role().is_some_and(|r| r.eq_ignore_ascii_case(role))
                    && name.as_ref().map_or(true, |n| {
                        normalize_whitespace(&element.accessible_name())
                            .eq_ignore_ascii_case(&normalize_whitespace(n))
                    })
            }
            Self::TestId(id) => element.attr("data-testid") == Some(id.as_str()),
            Self::Label(label) => {
                element.attr("aria-label") == Some(label.as_str())
                    || element.accessible_name() == *label
            }
            Self::Placeholder(p) => element.attr("placeholder") == Some(p.as_str()),
            Self::Nth { base, .. } => base.matches(element),
        }
    }

    /// All elements matched by this selector, in document order
    #[must_use]
    pub fn query_all<'a>(&self, elements: &'a [ElementHandle]) -> Vec<&'a ElementHandle> {
        match self {
            Self::Nth { base, index } => base
                .query_all(elements)
                .into_iter()
                .nth(*index)
                .into_iter()
                .collect(),
            _ => elements.iter().filter(|e| self.matches(e)).collect(),
        }
    }
}

/// Structured hints recovered from a locator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorHints {
    /// Tag name of the target
    pub tag: Option<String>,
    /// DOM id
    pub id: Option<String>,
    /// Class tokens
    pub classes: Vec<String>,
    /// Other attribute values (name, data-*, aria-label, ...)
    pub attributes: BTreeMap<String, String>,
    /// Explicit ARIA role
    pub role: Option<String>,
    /// Accessible name / label
    pub label: Option<String>,
    /// Literal text fragments
    pub texts: Vec<String>,
    /// Tag of the parent step, if the query names one
    pub parent_tag: Option<String>,
    /// Number of steps in the query
    pub depth: usize,
}

impl LocatorHints {
    /// Derive hints from a parsed selector
    #[must_use]
    pub fn from_selector(selector: &Selector) -> Self {
        let mut hints = Self::default();
        match selector {
            Selector::Css(query) | Selector::XPath(query) => hints.absorb_steps(query.primary()),
            Selector::Text { text, .. } => {
                hints.texts.push(text.clone());
                hints.depth = 1;
            }
            Selector::Role { role, name } => {
                hints.role = Some(role.to_lowercase());
                if let Some(name) = name {
                    hints.label = Some(name.clone());
                    hints.texts.push(name.clone());
                }
                hints.depth = 1;
            }
            Selector::TestId(id) => {
                hints
                    .attributes
                    .insert("data-testid".to_string(), id.clone());
                hints.depth = 1;
            }
            Selector::Label(label) => {
                hints.label = Some(label.clone());
                hints.depth = 1;
            }
            Selector::Placeholder(p) => {
                hints.attributes.insert("placeholder".to_string(), p.clone());
                hints.label = Some(p.clone());
                hints.depth = 1;
            }
            Selector::Nth { base, .. } => return Self::from_selector(base),
        }
        hints
    }

    fn absorb_steps(&mut self, steps: &[Step]) {
        self.depth = steps.len();
        if steps.len() >= 2 {
            self.parent_tag = steps[steps.len() - 2]
                .compound
                .tag
                .clone()
                .filter(|t| t != "*");
        }
        let Some(last) = steps.last() else {
            return;
        };
        let compound = &last.compound;
        self.tag = compound
            .tag
            .as_ref()
            .filter(|t| t.as_str() != "*")
            .map(|t| t.to_lowercase());
        self.id = compound.id().map(str::to_string);
        self.classes = compound.classes().into_iter().map(str::to_string).collect();
        for attr in &compound.attrs {
            if attr.name == "id" || attr.name == "class" || attr.value.is_empty() {
                continue;
            }
            match attr.name.as_str() {
                "role" => self.role = Some(attr.value.to_lowercase()),
                "aria-label" | "title" => {
                    self.label.get_or_insert_with(|| attr.value.clone());
                }
                "placeholder" | "alt" => {
                    self.label.get_or_insert_with(|| attr.value.clone());
                }
                _ => {}
            }
            self.attributes.insert(attr.name.clone(), attr.value.clone());
        }
        if let Some(text) = &compound.text {
            self.texts.push(text.value.clone());
        }
    }

    /// Words carried by identifiers (id, classes, test ids, name)
    #[must_use]
    pub fn identifier_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        if let Some(id) = &self.id {
            words.extend(crate::similarity::tokenize(id));
        }
        for class in &self.classes {
            words.extend(crate::similarity::tokenize(class));
        }
        for (name, value) in &self.attributes {
            if name == "name" || name.starts_with("data-") {
                words.extend(crate::similarity::tokenize(value));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        words.retain(|w| seen.insert(w.clone()));
        words
    }

    /// Identifier-like values worth comparing against element attributes
    #[must_use]
    pub fn identifier_values(&self) -> Vec<(String, String)> {
        let mut values = Vec::new();
        if let Some(id) = &self.id {
            values.push(("id".to_string(), id.clone()));
        }
        for (name, value) in &self.attributes {
            if matches!(name.as_str(), "name" | "aria-label" | "title" | "placeholder")
                || name.starts_with("data-")
            {
                values.push((name.clone(), value.clone()));
            }
        }
        values
    }
}

/// A locator: how a test finds one element.
///
/// Immutable once captured; the parsed form travels with the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Locator {
    raw: String,
    selector: Selector,
    hints: LocatorHints,
}

impl Locator {
    /// Capture a locator from its textual form
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let selector = Selector::parse(&raw);
        let hints = LocatorHints::from_selector(&selector);
        Self {
            raw,
            selector,
            hints,
        }
    }

    /// `#id`, or `[id="..."]` when the id is not a plain CSS identifier
    #[must_use]
    pub fn by_id(id: &str) -> Self {
        if is_css_ident(id) {
            Self::new(format!("#{id}"))
        } else {
            Self::by_attribute("id", id)
        }
    }

    /// `[name="value"]`
    #[must_use]
    pub fn by_attribute(name: &str, value: &str) -> Self {
        Self::new(format!("[{name}={}]", quote(value)))
    }

    /// `tag.class1.class2`
    #[must_use]
    pub fn by_classes(tag: Option<&str>, classes: &[&str]) -> Self {
        let mut css = tag.unwrap_or_default().to_string();
        for class in classes {
            css.push('.');
            css.push_str(class);
        }
        Self::new(css)
    }

    /// `role=button[name="Submit"]`
    #[must_use]
    pub fn by_role(role: &str, name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => {
                Self::new(format!("role={role}[name={}]", quote(name)))
            }
            _ => Self::new(format!("role={role}")),
        }
    }

    /// `text="..."`
    #[must_use]
    pub fn by_text(text: &str) -> Self {
        Self::new(format!("text={}", quote(text)))
    }

    /// `<base> >> nth=<index>`
    #[must_use]
    pub fn nth(base: &Self, index: usize) -> Self {
        Self::new(format!("{} >> nth={index}", base.raw))
    }

    /// Raw text as written by the test
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Structured hints
    #[must_use]
    pub const fn hints(&self) -> &LocatorHints {
        &self.hints
    }

    /// Elements this locator resolves to
    #[must_use]
    pub fn query_all<'a>(&self, elements: &'a [ElementHandle]) -> Vec<&'a ElementHandle> {
        self.selector.query_all(elements)
    }

    /// Number of elements this locator resolves to
    #[must_use]
    pub fn count(&self, elements: &[ElementHandle]) -> usize {
        self.query_all(elements).len()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.raw
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Double-quote a value, escaping backslashes and quotes
#[must_use]
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Strip one level of matching quotes, resolving backslash escapes
fn unquote(s: &str) -> Option<String> {
    let s = s.trim();
    let first = s.chars().next()?;
    if !matches!(first, '"' | '\'' | '`') || s.len() < 2 || !s.ends_with(first) {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn is_css_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn split_nth(s: &str) -> Option<(&str, usize)> {
    let idx = s.rfind(">>")?;
    let tail = s[idx + 2..].trim();
    let n = tail.strip_prefix("nth=")?.trim().parse().ok()?;
    Some((s[..idx].trim(), n))
}

/// Split on `sep` outside quotes, brackets and parentheses
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote_char: Option<char> = None;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (quote_char, c) {
            (_, '\\') => {
                escaped = true;
                current.push(c);
            }
            (Some(q), _) if c == q => {
                quote_char = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"' | '\'') => {
                quote_char = Some(c);
                current.push(c);
            }
            (None, '[' | '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ']' | ')') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, _) if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_css_chain(source: &str) -> Vec<Step> {
    // Tokenize into compounds and combinators at depth 0
    let mut steps = Vec::new();
    let mut pending = Combinator::Descendant;
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote_char: Option<char> = None;
    let mut escaped = false;

    let flush = |current: &mut String, pending: &mut Combinator, steps: &mut Vec<Step>| {
        let text = current.trim();
        if !text.is_empty() {
            steps.push(Step {
                combinator: *pending,
                compound: parse_compound(text),
            });
            *pending = Combinator::Descendant;
        }
        current.clear();
    };

    for c in source.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        if let Some(q) = quote_char {
            if c == '\\' {
                escaped = true;
            } else if c == q {
                quote_char = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '"' | '\'' => {
                quote_char = Some(c);
                current.push(c);
            }
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '>' | '+' | '~' if depth == 0 => {
                flush(&mut current, &mut pending, &mut steps);
                // Sibling combinators are approximated as descendant
                pending = if c == '>' {
                    Combinator::Child
                } else {
                    Combinator::Descendant
                };
            }
            c if c.is_whitespace() && depth == 0 => {
                flush(&mut current, &mut pending, &mut steps);
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut pending, &mut steps);
    steps
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(text: &str) -> Compound {
    let chars: Vec<char> = text.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && (is_ident_char(chars[*i]) || chars[*i] == '\\') {
            if chars[*i] == '\\' {
                *i += 1;
            }
            *i += 1;
        }
        chars[start..(*i).min(chars.len())]
            .iter()
            .filter(|c| **c != '\\')
            .collect()
    };

    if i < chars.len() && (chars[i] == '*' || is_ident_char(chars[i])) {
        let tag = if chars[i] == '*' {
            i += 1;
            "*".to_string()
        } else {
            read_ident(&mut i)
        };
        compound.tag = Some(tag.to_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let id = read_ident(&mut i);
                compound.attrs.push(AttrMatcher {
                    name: "id".to_string(),
                    op: AttrOp::Equals,
                    value: id,
                });
            }
            '.' => {
                i += 1;
                let class = read_ident(&mut i);
                compound.attrs.push(AttrMatcher {
                    name: "class".to_string(),
                    op: AttrOp::Word,
                    value: class,
                });
            }
            '[' => {
                let end = find_closing(&chars, i, '[', ']').unwrap_or(chars.len());
                let inner: String = chars[i + 1..end].iter().collect();
                if let Some(attr) = parse_attr(&inner) {
                    compound.attrs.push(attr);
                }
                i = end + 1;
            }
            ':' => {
                i += 1;
                let name = read_ident(&mut i);
                let mut arg = None;
                if i < chars.len() && chars[i] == '(' {
                    let end = find_closing(&chars, i, '(', ')').unwrap_or(chars.len());
                    arg = Some(chars[i + 1..end].iter().collect::<String>());
                    i = end + 1;
                }
                if let Some(arg) = arg.filter(|a| !a.trim().is_empty()) {
                    match name.as_str() {
                        "has-text" | "text" | "contains" => {
                            compound.text = Some(TextMatch {
                                value: unquote(&arg).unwrap_or_else(|| arg.trim().to_string()),
                                exact: false,
                            });
                        }
                        "text-is" => {
                            compound.text = Some(TextMatch {
                                value: unquote(&arg).unwrap_or_else(|| arg.trim().to_string()),
                                exact: true,
                            });
                        }
                        _ => {}
                    }
                }
            }
            _ => i += 1,
        }
    }
    compound
}

/// Index of the bracket closing the one at `open_at`; `None` when unclosed
fn find_closing(chars: &[char], open_at: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote_char: Option<char> = None;
    let mut i = open_at;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote_char {
            if c == '\\' {
                i += 1;
            } else if c == q {
                quote_char = None;
            }
        } else if c == '"' || c == '\'' {
            quote_char = Some(c);
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn parse_attr(inner: &str) -> Option<AttrMatcher> {
    let inner = inner.trim();
    let ops = [
        ("*=", AttrOp::Contains),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("~=", AttrOp::Word),
        ("|=", AttrOp::Prefix),
        ("=", AttrOp::Equals),
    ];
    for (token, op) in ops {
        if let Some(pos) = inner.find(token) {
            let name = inner[..pos].trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                continue;
            }
            let mut value = inner[pos + token.len()..].trim();
            // Case-insensitivity flag: [attr="v" i]
            if let Some(stripped) = value.strip_suffix(" i") {
                value = stripped.trim_end();
            }
            let value = unquote(value).unwrap_or_else(|| value.to_string());
            return Some(AttrMatcher {
                name: name.to_lowercase(),
                op,
                value,
            });
        }
    }
    if inner.is_empty() {
        return None;
    }
    Some(AttrMatcher {
        name: inner.to_lowercase(),
        op: AttrOp::Exists,
        value: String::new(),
    })
}

// ----------------------------------------------------------------------------
// XPath subset
// ----------------------------------------------------------------------------

fn parse_xpath_chain(source: &str) -> Vec<Step> {
    let mut chars: Vec<char> = source.trim().chars().collect();
    // `(//a)[2]` style grouping: keep the inner path
    if chars.first() == Some(&'(') {
        let end = find_closing(&chars, 0, '(', ')').unwrap_or(chars.len());
        chars = chars[1..end].to_vec();
    }

    let mut steps = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let combinator = if chars[i] == '/' {
            if i + 1 < chars.len() && chars[i + 1] == '/' {
                i += 2;
                Combinator::Descendant
            } else {
                i += 1;
                Combinator::Child
            }
        } else {
            Combinator::Descendant
        };

        let start = i;
        let mut depth = 0usize;
        let mut quote_char: Option<char> = None;
        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote_char {
                if c == q {
                    quote_char = None;
                }
            } else if c == '"' || c == '\'' {
                quote_char = Some(c);
            } else if c == '[' {
                depth += 1;
            } else if c == ']' {
                depth = depth.saturating_sub(1);
            } else if c == '/' && depth == 0 {
                break;
            }
            i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        if !text.trim().is_empty() {
            steps.push(Step {
                combinator,
                compound: parse_xpath_step(text.trim()),
            });
        }
    }
    // The first step is relative to the document root either way
    if let Some(first) = steps.first_mut() {
        first.combinator = Combinator::Descendant;
    }
    steps
}

#[allow(clippy::expect_used)]
fn xpath_clause_regexes() -> &'static [(Regex, XPathClause); 5] {
    static RES: OnceLock<[(Regex, XPathClause); 5]> = OnceLock::new();
    RES.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("xpath clause pattern is a valid regex");
        [
            (
                re(r#"^@([\w-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')$"#),
                XPathClause::AttrEquals,
            ),
            (
                re(r#"^contains\(\s*@([\w-]+)\s*,\s*(?:"([^"]*)"|'([^']*)')\s*\)$"#),
                XPathClause::AttrContains,
            ),
            (
                re(r#"^(?:text\(\)|normalize-space\((?:text\(\)|\.)?\)|\.)\s*=\s*(?:"([^"]*)"|'([^']*)')$"#),
                XPathClause::TextEquals,
            ),
            (
                re(r#"^contains\(\s*(?:text\(\)|normalize-space\((?:text\(\)|\.)?\)|\.)\s*,\s*(?:"([^"]*)"|'([^']*)')\s*\)$"#),
                XPathClause::TextContains,
            ),
            (re(r"^@([\w-]+)$"), XPathClause::AttrExists),
        ]
    })
}

#[derive(Debug, Clone, Copy)]
enum XPathClause {
    AttrEquals,
    AttrContains,
    TextEquals,
    TextContains,
    AttrExists,
}

fn parse_xpath_step(step: &str) -> Compound {
    let mut compound = Compound::default();
    let tag_end = step.find('[').unwrap_or(step.len());
    let tag = step[..tag_end].trim();
    if !tag.is_empty() && tag != "*" && tag != "node()" {
        compound.tag = Some(tag.to_lowercase());
    }

    let chars: Vec<char> = step.chars().collect();
    let mut i = step[..tag_end].chars().count();
    while i < chars.len() {
        if chars[i] != '[' {
            i += 1;
            continue;
        }
        let end = find_closing(&chars, i, '[', ']').unwrap_or(chars.len());
        let predicate: String = chars[i + 1..end].iter().collect();
        for clause in predicate.split(" and ") {
            apply_xpath_clause(&mut compound, clause.trim());
        }
        i = end + 1;
    }
    compound
}

fn apply_xpath_clause(compound: &mut Compound, clause: &str) {
    for (re, kind) in xpath_clause_regexes() {
        let Some(caps) = re.captures(clause) else {
            continue;
        };
        let quoted = |a: usize, b: usize| {
            caps.get(a)
                .or_else(|| caps.get(b))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        match kind {
            XPathClause::AttrEquals | XPathClause::AttrContains => {
                let name = caps[1].to_lowercase();
                let value = quoted(2, 3);
                let op = match (kind, name.as_str()) {
                    (XPathClause::AttrContains, "class") => AttrOp::Word,
                    (XPathClause::AttrContains, _) => AttrOp::Contains,
                    _ => AttrOp::Equals,
                };
                if name == "class" && matches!(op, AttrOp::Equals) {
                    for class in value.split_whitespace() {
                        compound.attrs.push(AttrMatcher {
                            name: "class".to_string(),
                            op: AttrOp::Word,
                            value: class.to_string(),
                        });
                    }
                } else {
                    compound.attrs.push(AttrMatcher { name, op, value });
                }
            }
            XPathClause::TextEquals | XPathClause::TextContains => {
                compound.text = Some(TextMatch {
                    value: quoted(1, 2),
                    exact: matches!(kind, XPathClause::TextEquals),
                });
            }
            XPathClause::AttrExists => compound.attrs.push(AttrMatcher {
                name: caps[1].to_lowercase(),
                op: AttrOp::Exists,
                value: String::new(),
            }),
        }
        return;
    }
}

// ----------------------------------------------------------------------------
// Role engine and getBy* helpers
// ----------------------------------------------------------------------------

fn parse_role_engine(rest: &str) -> Selector {
    let rest = rest.trim();
    let role_end = rest.find('[').unwrap_or(rest.len());
    let role = rest[..role_end].trim().to_lowercase();
    let mut name = None;
    let chars: Vec<char> = rest.chars().collect();
    let mut i = rest[..role_end].chars().count();
    while i < chars.len() {
        if chars[i] != '[' {
            i += 1;
            continue;
        }
        let end = find_closing(&chars, i, '[', ']').unwrap_or(chars.len());
        let inner: String = chars[i + 1..end].iter().collect();
        if let Some(attr) = parse_attr(&inner) {
            if attr.name == "name" {
                name = Some(attr.value);
            }
        }
        i = end + 1;
    }
    Selector::Role { role, name }
}

#[allow(clippy::expect_used)]
fn get_by_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(?:page\.)?getBy(Role|Text|TestId|Label|Placeholder|Title|AltText)\(\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)\s*(?:,\s*\{(.*)\})?\s*\)$"#,
        )
        .expect("getBy pattern is a valid regex")
    })
}

#[allow(clippy::expect_used)]
fn option_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name\s*:\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#)
            .expect("name option pattern is a valid regex")
    })
}

fn parse_get_by(s: &str) -> Option<Selector> {
    let caps = get_by_regex().captures(s)?;
    let value = caps
        .get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let options = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
    let exact = options.contains("exact: true") || options.contains("exact:true");

    Some(match &caps[1] {
        "Role" => {
            let name = option_name_regex().captures(options).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .or_else(|| c.get(3))
                    .map(|m| m.as_str().to_string())
            });
            Selector::Role {
                role: value.to_lowercase(),
                name,
            }
        }
        "Text" => Selector::Text { text: value, exact },
        "TestId" => Selector::TestId(value),
        "Label" => Selector::Label(value),
        "Placeholder" => Selector::Placeholder(value),
        "Title" => Selector::Css(StructuralQuery::css(&format!("[title={}]", quote(&value)))),
        _ => Selector::Css(StructuralQuery::css(&format!("[alt={}]", quote(&value)))),
    })
}
