//! Core data types for learned selectors and extracted values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled number taken from a reference report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelValue {
    pub label: String,
    /// The numeral exactly as it appeared in the report.
    pub value_str: String,
    pub value_float: Option<f64>,
    pub unit: Option<String>,
}

/// Layout rectangle of a rendered element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// How strongly an element's text matches a target numeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    ExactUnit,
    Partial,
}

impl MatchTier {
    /// Base score for the tier, before area and label bonuses.
    pub fn base_score(self) -> f64 {
        match self {
            MatchTier::Exact => 60.0,
            MatchTier::ExactUnit => 45.0,
            MatchTier::Partial => 10.0,
        }
    }
}

/// A scored element proposed as the home of a target value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub path: String,
    pub bounding_box: BoundingBox,
    pub score: f64,
    pub tier: MatchTier,
}

/// Kind of extraction a selector entry performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    #[default]
    Text,
}

/// Persisted locator for one label.
///
/// An empty `selector` is a recorded miss: learning ran for this label but
/// found nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub selector: String,
    #[serde(rename = "type", default)]
    pub kind: SelectorKind,
    pub expect: String,
}

impl SelectorEntry {
    pub fn found(selector: impl Into<String>, expect: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorKind::Text,
            expect: expect.into(),
        }
    }

    pub fn missing(expect: impl Into<String>) -> Self {
        Self::found(String::new(), expect)
    }

    pub fn is_miss(&self) -> bool {
        self.selector.is_empty()
    }
}

/// Label → selector entry.
pub type SelectorMap = BTreeMap<String, SelectorEntry>;

/// A selector map together with the reference URL it was learned from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorTemplate {
    pub url: String,
    #[serde(default)]
    pub selectors: SelectorMap,
}

/// Values extracted from one page. `None` marks a resolution or parse miss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedResult {
    pub labels: BTreeMap<String, Option<f64>>,
}

impl AppliedResult {
    /// A result with every label of `map` set to `None`.
    pub fn all_missing(map: &SelectorMap) -> Self {
        Self {
            labels: map.keys().map(|label| (label.clone(), None)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.labels.get(label).copied().flatten()
    }
}

/// Applied values for one URL in a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub labels: BTreeMap<String, Option<f64>>,
    /// Set when the page could not be loaded at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Date key (`YYYY-MM-DD` or `"unknown"`) → records in batch order.
pub type DateBucketedRecords = BTreeMap<String, Vec<PageRecord>>;

/// Errors that can occur while learning or applying selectors.
#[derive(thiserror::Error, Debug)]
pub enum SelmapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("No URLs to process")]
    EmptyBatch,
}

/// Convenience result type.
pub type SelmapResult<T> = Result<T, SelmapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_entry_serializes_type_tag() {
        let entry = SelectorEntry::found("#weight", "62.5");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["selector"], "#weight");
        assert_eq!(json["type"], "text");
        assert_eq!(json["expect"], "62.5");
    }

    #[test]
    fn test_missing_entry_keeps_expect() {
        let entry = SelectorEntry::missing("171.0");
        assert!(entry.is_miss());
        assert_eq!(entry.expect, "171.0");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"selector\":\"\""));
    }

    #[test]
    fn test_applied_result_serializes_nulls() {
        let mut result = AppliedResult::default();
        result.labels.insert("Weight".into(), Some(62.5));
        result.labels.insert("Height".into(), None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["labels"]["Weight"], 62.5);
        assert!(json["labels"]["Height"].is_null());
    }

    #[test]
    fn test_page_record_omits_absent_error() {
        let record = PageRecord {
            url: "https://example.com".into(),
            labels: BTreeMap::new(),
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_tier_base_scores() {
        assert_eq!(MatchTier::Exact.base_score(), 60.0);
        assert_eq!(MatchTier::ExactUnit.base_score(), 45.0);
        assert_eq!(MatchTier::Partial.base_score(), 10.0);
        assert_eq!(
            serde_json::to_value(MatchTier::ExactUnit).unwrap(),
            "exact_unit"
        );
    }
}
