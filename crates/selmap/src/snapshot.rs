//! Plain-data view of the leaf elements of a rendered page.
//!
//! The browser side only enumerates: every leaf under `<body>` is reported
//! with its text, layout box, computed visibility and a bounded ancestor
//! chain. Everything that decides (visibility, matching, scoring, locator
//! synthesis) runs in Rust over this snapshot.

use crate::renderer::RenderContext;
use crate::types::{BoundingBox, SelmapError, SelmapResult};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// In-page enumeration script, called with `{ "maxDepth": n }`.
pub const SNAPSHOT_SCRIPT: &str = include_str!("snapshot.js");

/// Ancestor levels recorded per leaf, the leaf itself included.
pub const DEFAULT_MAX_DEPTH: usize = 6;

/// Estimated glyph width for static HTML, in CSS pixels.
pub const CHAR_WIDTH_PX: f64 = 8.0;

/// Estimated line height for static HTML, in CSS pixels.
pub const LINE_HEIGHT_PX: f64 = 16.0;

/// Elements that never produce a layout box.
const NON_RENDERED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// One level of a leaf's ancestor chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// 1-based index among same-tag siblings; `None` without a parent.
    #[serde(default)]
    pub nth_of_type: Option<usize>,
}

impl ChainStep {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn nth(mut self, n: usize) -> Self {
        self.nth_of_type = Some(n);
        self
    }
}

/// An element with no element children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafElement {
    /// Rendered text, trimmed.
    pub text: String,
    #[serde(rename = "rect")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub display: String,
    /// Aggregate text of the immediate parent.
    #[serde(default)]
    pub parent_text: Option<String>,
    /// True when the element's id occurs exactly once in the document.
    #[serde(default)]
    pub id_unique: bool,
    /// The element itself first, then its ancestors, stopping below `<body>`.
    #[serde(default)]
    pub chain: Vec<ChainStep>,
}

impl LeafElement {
    pub fn element_id(&self) -> Option<&str> {
        self.chain
            .first()
            .and_then(|step| step.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// All leaf elements of a page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub leaves: Vec<LeafElement>,
}

impl DomSnapshot {
    pub fn new(leaves: Vec<LeafElement>) -> Self {
        Self { leaves }
    }

    /// Enumerate the leaves of a static HTML document.
    ///
    /// Used where no browser is available. Layout is estimated from text
    /// length ([`CHAR_WIDTH_PX`] per character, one [`LINE_HEIGHT_PX`] line)
    /// and visibility is read from the `hidden` attribute and inline
    /// `display` / `visibility` styles, so scoring sees the same shape of
    /// data the in-page script reports.
    pub fn from_html(html: &str, max_depth: usize) -> Self {
        let document = Html::parse_document(html);
        let (Ok(with_id), Ok(in_body)) = (Selector::parse("[id]"), Selector::parse("body *")) else {
            return Self::default();
        };

        let mut id_counts: HashMap<&str, usize> = HashMap::new();
        for el in document.select(&with_id) {
            if let Some(id) = el.value().id() {
                *id_counts.entry(id).or_default() += 1;
            }
        }

        let mut leaves = Vec::new();
        for el in document.select(&in_body) {
            if el.children().any(|child| child.value().is_element()) {
                continue;
            }

            let text = element_text(el);
            let rendered = is_rendered(el);
            let bounding_box = if rendered && !text.is_empty() {
                BoundingBox {
                    x: 0.0,
                    y: leaves.len() as f64 * LINE_HEIGHT_PX,
                    width: text.chars().count() as f64 * CHAR_WIDTH_PX,
                    height: LINE_HEIGHT_PX,
                }
            } else {
                BoundingBox::default()
            };
            let display = if rendered {
                style_value(el, "display").unwrap_or_else(|| "block".to_string())
            } else {
                "none".to_string()
            };
            let visibility = match ancestors_and_self(el).find_map(|e| style_value(e, "visibility")) {
                Some(v) if v == "hidden" || v == "collapse" => "hidden",
                _ => "visible",
            };

            leaves.push(LeafElement {
                text,
                bounding_box,
                visibility: visibility.to_string(),
                display,
                parent_text: parent_element(el).map(element_text),
                id_unique: el
                    .value()
                    .id()
                    .is_some_and(|id| id_counts.get(id) == Some(&1)),
                chain: chain_of(el, max_depth.max(1)),
            });
        }
        Self { leaves }
    }
}

/// Enumerate the leaf elements of the page currently loaded in `ctx`.
pub async fn capture_snapshot(
    ctx: &dyn RenderContext,
    max_depth: usize,
) -> SelmapResult<DomSnapshot> {
    let args = json!({ "maxDepth": max_depth });
    let value = ctx
        .evaluate(SNAPSHOT_SCRIPT, args)
        .await
        .map_err(|e| SelmapError::Render(format!("snapshot script failed: {e:#}")))?;
    Ok(serde_json::from_value(value)?)
}

// ── Static HTML helpers ──

/// Text content with whitespace runs collapsed, trimmed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parent_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}

fn ancestors_and_self(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::successors(Some(el), |e| parent_element(*e))
}

/// Lowercased value of `property` in the element's inline style.
fn style_value(el: ElementRef<'_>, property: &str) -> Option<String> {
    el.value().attr("style")?.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(property)
            .then(|| value.trim().to_ascii_lowercase())
    })
}

fn is_rendered(el: ElementRef<'_>) -> bool {
    ancestors_and_self(el).all(|e| {
        !NON_RENDERED_TAGS.contains(&e.value().name())
            && e.value().attr("hidden").is_none()
            && style_value(e, "display").as_deref() != Some("none")
    })
}

fn step_of(el: ElementRef<'_>) -> ChainStep {
    let tag = el.value().name();
    let nth_of_type = parent_element(el).and_then(|parent| {
        parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|sibling| sibling.value().name() == tag)
            .position(|sibling| sibling == el)
            .map(|idx| idx + 1)
    });
    ChainStep {
        tag: tag.to_string(),
        id: el.value().id().map(str::to_string),
        classes: el
            .value()
            .attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        nth_of_type,
    }
}

/// Self first, stopping below `<body>`.
fn chain_of(el: ElementRef<'_>, max_depth: usize) -> Vec<ChainStep> {
    ancestors_and_self(el)
        .take_while(|e| e.value().name() != "body")
        .take(max_depth)
        .map(step_of)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_script_output() {
        let raw = json!({
            "leaves": [{
                "text": "62.5",
                "rect": { "x": 10.0, "y": 20.0, "width": 40.0, "height": 18.0 },
                "visibility": "visible",
                "display": "inline",
                "parentText": "Weight 62.5",
                "idUnique": false,
                "chain": [
                    { "tag": "span", "id": null, "classes": ["val"], "nthOfType": 2 },
                    { "tag": "div", "classes": [], "nthOfType": 1 }
                ]
            }]
        });
        let snapshot: DomSnapshot = serde_json::from_value(raw).unwrap();
        let leaf = &snapshot.leaves[0];
        assert_eq!(leaf.text, "62.5");
        assert_eq!(leaf.bounding_box.width, 40.0);
        assert_eq!(leaf.parent_text.as_deref(), Some("Weight 62.5"));
        assert_eq!(leaf.chain[0].nth_of_type, Some(2));
        assert_eq!(leaf.chain[1].id, None);
        assert_eq!(leaf.element_id(), None);
    }

    #[test]
    fn test_element_id_ignores_empty() {
        let leaf = LeafElement {
            chain: vec![ChainStep::new("span").with_id("")],
            ..LeafElement::default()
        };
        assert_eq!(leaf.element_id(), None);
    }

    #[test]
    fn test_from_html_leaves_and_chains() {
        let html = r#"<html><body>
            <div class="card css-7x">
              <span>Weight</span>
              <span class="val" id="w">62.5 kg</span>
            </div>
            <p id="dup">1</p><p id="dup">2</p>
          </body></html>"#;
        let snapshot = DomSnapshot::from_html(html, DEFAULT_MAX_DEPTH);
        assert_eq!(snapshot.leaves.len(), 4);

        let value = &snapshot.leaves[1];
        assert_eq!(value.text, "62.5 kg");
        assert_eq!(value.parent_text.as_deref(), Some("Weight 62.5 kg"));
        assert!(value.id_unique);
        assert_eq!(value.element_id(), Some("w"));
        assert_eq!(value.chain.len(), 2);
        assert_eq!(value.chain[0].tag, "span");
        assert_eq!(value.chain[0].nth_of_type, Some(2));
        assert_eq!(value.chain[1].classes, vec!["card", "css-7x"]);
        assert_eq!(value.chain[1].nth_of_type, Some(1));
        assert_eq!(value.bounding_box.width, 7.0 * CHAR_WIDTH_PX);
        assert_eq!(value.bounding_box.height, LINE_HEIGHT_PX);

        assert!(!snapshot.leaves[2].id_unique);
        assert_eq!(snapshot.leaves[3].chain[0].nth_of_type, Some(2));
    }

    #[test]
    fn test_from_html_visibility() {
        let html = r#"<body>
            <div style="display: none"><b>1</b></div>
            <i hidden>2</i>
            <div style="visibility:hidden"><u>3</u></div>
            <script>var x = 4;</script>
            <em>5</em>
          </body>"#;
        let snapshot = DomSnapshot::from_html(html, DEFAULT_MAX_DEPTH);
        let by_text = |t: &str| {
            snapshot
                .leaves
                .iter()
                .find(|l| l.text == t)
                .unwrap()
                .clone()
        };

        assert_eq!(by_text("1").display, "none");
        assert_eq!(by_text("1").bounding_box.area(), 0.0);
        assert_eq!(by_text("2").display, "none");
        assert_eq!(by_text("3").visibility, "hidden");
        assert_eq!(by_text("var x = 4;").display, "none");
        assert_eq!(by_text("5").display, "block");
        assert_eq!(by_text("5").visibility, "visible");
    }

    #[test]
    fn test_from_html_depth_limit() {
        let html = "<body><div><div><div><div><span>7</span></div></div></div></div></body>";
        let snapshot = DomSnapshot::from_html(html, 3);
        assert_eq!(snapshot.leaves[0].chain.len(), 3);
        assert_eq!(DomSnapshot::from_html(html, 10).leaves[0].chain.len(), 5);
    }

    #[test]
    fn test_script_is_a_function_of_args() {
        assert!(SNAPSHOT_SCRIPT.trim_start().starts_with("(args) =>"));
        assert!(SNAPSHOT_SCRIPT.contains("maxDepth"));
    }
}
