//! Structural locators for learned elements.
//!
//! A locator is either a unique id (`#weight`) or a chain of at most
//! [`MAX_SEGMENTS`] child-combinator segments, outermost first:
//!
//! ```text
//! div.report:nth-of-type(1) > ul:nth-of-type(2) > li.row:nth-of-type(3) > span.val:nth-of-type(1)
//! ```
//!
//! Each segment is the tag, up to two class tokens without digits (digit
//! classes tend to be generated per build) and the position among same-tag
//! siblings. Locators render as plain CSS selectors so a browser can
//! resolve them with `querySelector`; offline, [`scraper`] resolves the
//! same strings.

use crate::snapshot::{ChainStep, LeafElement};
use crate::types::{SelmapError, SelmapResult};
use scraper::Selector;
use std::fmt;

/// Upper bound on path segments in a synthesized locator.
pub const MAX_SEGMENTS: usize = 6;

/// Class tokens kept per segment.
pub const MAX_CLASSES: usize = 2;

/// One `tag.class:nth-of-type(n)` compound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub tag: String,
    pub classes: Vec<String>,
    pub nth_of_type: Option<usize>,
}

impl Segment {
    fn from_step(step: &ChainStep) -> Self {
        Self {
            tag: step.tag.to_lowercase(),
            classes: step
                .classes
                .iter()
                .filter(|c| is_stable_class(c))
                .take(MAX_CLASSES)
                .cloned()
                .collect(),
            nth_of_type: step.nth_of_type,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)?;
        for class in &self.classes {
            write!(f, ".{}", css_escape(class))?;
        }
        if let Some(n) = self.nth_of_type {
            write!(f, ":nth-of-type({n})")?;
        }
        Ok(())
    }
}

/// Where to find a learned value on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Path(Vec<Segment>),
}

impl Locator {
    /// Number of structural segments (an id locator counts as one).
    pub fn segment_count(&self) -> usize {
        match self {
            Locator::Id(_) => 1,
            Locator::Path(segments) => segments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Locator::Path(segments) if segments.is_empty())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", css_escape(id)),
            Locator::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" > ")?;
                    }
                    write!(f, "{segment}")?;
                }
                Ok(())
            }
        }
    }
}

/// Build a locator for `leaf`.
///
/// A document-unique id wins outright. Otherwise the ancestor chain is
/// walked from the leaf upward for at most [`MAX_SEGMENTS`] levels.
pub fn synthesize(leaf: &LeafElement) -> Locator {
    if leaf.id_unique {
        if let Some(id) = leaf.element_id() {
            return Locator::Id(id.to_string());
        }
    }

    let mut segments: Vec<Segment> = leaf
        .chain
        .iter()
        .take(MAX_SEGMENTS)
        .map(Segment::from_step)
        .collect();
    segments.reverse();
    Locator::Path(segments)
}

/// Class tokens containing a digit are treated as generated and skipped.
pub fn is_stable_class(class: &str) -> bool {
    !class.is_empty() && !class.chars().any(|c| c.is_ascii_digit())
}

/// Escape an identifier the way `CSS.escape` does.
pub fn css_escape(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len());
    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if c == '\0' {
            out.push('\u{FFFD}');
        } else if (0x1..=0x1f).contains(&code)
            || code == 0x7f
            || (i == 0 && c.is_ascii_digit())
            || (i == 1 && c.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{code:x} "));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if code >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Check that `selector` is a CSS selector the page can resolve.
pub fn validate_selector(selector: &str) -> SelmapResult<()> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| SelmapError::InvalidLocator(format!("{selector:?}: {e}")))
}
