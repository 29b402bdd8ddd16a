//! Renderer that serves static HTML fixtures without a browser.
//!
//! Each URL maps to an HTML document. The snapshot script is answered by
//! enumerating the document with [`DomSnapshot::from_html`] and selectors
//! are resolved with [`scraper`], so learn and apply run fully offline
//! against real CSS semantics.

use super::{NavigationResult, RenderContext, Renderer};
use crate::snapshot::{element_text, DomSnapshot, DEFAULT_MAX_DEPTH, SNAPSHOT_SCRIPT};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Serves HTML documents keyed by URL.
///
/// Documents are stored as source text and parsed per call: `scraper`'s
/// tree is not `Send` and must never live across an `.await`.
#[derive(Default)]
pub struct ReplayRenderer {
    pages: Arc<HashMap<String, String>>,
    active_count: Arc<AtomicUsize>,
    opened_count: Arc<AtomicUsize>,
}

impl ReplayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` as the document at `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), html.into());
        self
    }

    /// Total contexts created so far.
    pub fn opened_contexts(&self) -> usize {
        self.opened_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Renderer for ReplayRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.opened_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ReplayContext {
            pages: Arc::clone(&self.pages),
            current: None,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A context showing one document at a time.
pub struct ReplayContext {
    pages: Arc<HashMap<String, String>>,
    current: Option<String>,
    active_count: Arc<AtomicUsize>,
}

impl ReplayContext {
    fn page(&self) -> Result<&str> {
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| anyhow!("no page loaded"))?;
        self.pages
            .get(url)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("no page served for {url}"))
    }
}

/// First element matching `selector`, as collapsed text.
fn select_first_text(html: &str, selector: &str) -> Result<String> {
    let selector_parsed =
        Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector:?}: {e}"))?;
    let document = Html::parse_document(html);
    let text = document
        .select(&selector_parsed)
        .next()
        .map(element_text)
        .ok_or_else(|| anyhow!("no element matches {selector}"))?;
    Ok(text)
}

#[async_trait]
impl RenderContext for ReplayContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        if !self.pages.contains_key(url) {
            bail!("navigation failed: no page served for {url}");
        }
        self.current = Some(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn evaluate(&self, script: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        if script != SNAPSHOT_SCRIPT {
            bail!("replay pages only answer the snapshot script");
        }
        let depth = args["maxDepth"]
            .as_u64()
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_MAX_DEPTH);
        let snapshot = DomSnapshot::from_html(self.page()?, depth);
        Ok(serde_json::to_value(snapshot)?)
    }

    async fn resolve_text(&self, selector: &str) -> Result<String> {
        select_first_text(self.page()?, selector)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}
