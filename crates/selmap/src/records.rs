//! Target URL lists and their grouping by report date.
//!
//! Report URLs carry a `t` query parameter with UNIX epoch seconds. That
//! timestamp, as a UTC calendar date, is the bucket key; URLs without a
//! usable `t` land under `"unknown"`.

use crate::types::SelmapResult;
use chrono::{DateTime, Datelike};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::form_urlencoded;

/// Bucket key for URLs without a usable timestamp.
pub const UNKNOWN_DATE: &str = "unknown";

/// Query parameter holding the epoch-seconds timestamp.
pub const TIMESTAMP_PARAM: &str = "t";

/// Source of target URLs, in processing order.
pub trait UrlRepository {
    fn urls(&self) -> SelmapResult<Vec<String>>;
}

/// A newline-delimited URL file. Blank lines and `#` comments are ignored.
#[derive(Debug, Clone)]
pub struct RecordsFile {
    path: PathBuf,
}

impl RecordsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UrlRepository for RecordsFile {
    /// A missing file yields an empty list.
    fn urls(&self) -> SelmapResult<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(parse_url_list(&text))
    }
}

/// A fixed list supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticUrls(pub Vec<String>);

impl UrlRepository for StaticUrls {
    fn urls(&self) -> SelmapResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Non-blank, non-comment lines of `text`, trimmed.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `YYYY-MM-DD` (UTC) from the URL's `t` parameter, or `"unknown"`.
///
/// The query is read from the text after the first `?` (fragment removed),
/// so scheme-less URLs work too. Blank values are skipped and the first
/// non-blank `t` decides.
pub fn date_key(url: &str) -> String {
    let without_fragment = url.split_once('#').map_or(url, |(head, _)| head);
    without_fragment
        .split_once('?')
        .and_then(|(_, query)| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, value)| key == TIMESTAMP_PARAM && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string())
        })
        .and_then(|value| value.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .filter(|dt| (1..=9999).contains(&dt.year()))
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Group URLs by [`date_key`], keeping list order inside each bucket.
pub fn group_by_date<I, S>(urls: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for url in urls {
        let url = url.as_ref();
        grouped.entry(date_key(url)).or_default().push(url.to_string());
    }
    grouped
}
