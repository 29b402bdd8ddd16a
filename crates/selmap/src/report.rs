//! Reference report parsing: text lines into labeled numbers.
//!
//! A report line looks like `Weight: 62.5 kg`. The label is the leading run
//! of letters, spaces and slashes; the first signed decimal in the remainder
//! is the value, and a trailing run of letters or `%` is the unit. Lines
//! that do not fit this shape are skipped, never treated as errors.

use crate::types::{LabelValue, SelmapResult};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Metadata lines that carry no measurement.
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &["name:", "gender:", "time/date"];

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z /]+)\s*:?\s*(.+)$").expect("valid line regex"))
}

fn numeral_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("valid numeral regex"))
}

fn unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z%]+$").expect("valid unit regex"))
}

/// First signed decimal numeral in `text`, as written.
pub fn find_numeral(text: &str) -> Option<&str> {
    numeral_regex().find(text).map(|m| m.as_str())
}

/// First signed decimal numeral in `text`, parsed.
pub fn parse_numeral(text: &str) -> Option<f64> {
    find_numeral(text).and_then(|n| n.parse::<f64>().ok())
}

/// Why a report line produced no [`LabelValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSkip {
    Blank,
    Metadata,
    /// No label/remainder split.
    NoLabel,
    /// Remainder holds no numeral.
    NoNumeral,
}

/// Line parser with a configurable list of metadata prefixes.
#[derive(Debug, Clone)]
pub struct ReportParser {
    skip_prefixes: Vec<String>,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::with_skip_prefixes(DEFAULT_SKIP_PREFIXES.iter().copied())
    }
}

impl ReportParser {
    /// Parser that skips lines starting with any of `prefixes`, compared
    /// case-insensitively.
    pub fn with_skip_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            skip_prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Parse a single report line.
    pub fn parse_line(&self, line: &str) -> Result<LabelValue, LineSkip> {
        let s = line.trim();
        if s.is_empty() {
            return Err(LineSkip::Blank);
        }

        let lower = s.to_lowercase();
        if self.skip_prefixes.iter().any(|p| lower.starts_with(p.as_str())) {
            return Err(LineSkip::Metadata);
        }

        let caps = line_regex().captures(s).ok_or(LineSkip::NoLabel)?;
        let label = caps[1].trim();
        let rest = caps[2].trim();
        if label.is_empty() {
            return Err(LineSkip::NoLabel);
        }

        let value_str = find_numeral(rest).ok_or(LineSkip::NoNumeral)?;
        let unit = unit_regex().find(rest).map(|m| m.as_str().to_string());

        Ok(LabelValue {
            label: label.to_string(),
            value_str: value_str.to_string(),
            value_float: value_str.parse::<f64>().ok(),
            unit,
        })
    }

    /// Parse report lines in order, dropping the ones that carry no value.
    pub fn extract<'a, I>(&self, lines: I) -> Vec<LabelValue>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = Vec::new();
        for (idx, line) in lines.into_iter().enumerate() {
            match self.parse_line(line) {
                Ok(value) => values.push(value),
                Err(LineSkip::Blank) => {}
                Err(reason) => debug!(line = idx + 1, ?reason, "skipping report line"),
            }
        }
        values
    }
}

/// Extract labeled values from report text using the default parser.
pub fn extract_labels(text: &str) -> Vec<LabelValue> {
    ReportParser::default().extract(text.lines())
}

/// Read a UTF-8 report file and extract its labeled values.
pub fn read_report(path: &Path) -> SelmapResult<Vec<LabelValue>> {
    let text = std::fs::read_to_string(path)?;
    Ok(extract_labels(&text))
}
