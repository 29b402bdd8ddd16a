//! Apply phase: resolve learned selectors and reparse their text.

use crate::renderer::{RenderContext, Renderer};
use crate::report::parse_numeral;
use crate::types::{AppliedResult, SelectorEntry, SelectorMap, SelmapError, SelmapResult};
use tracing::{debug, info, warn};

/// Why a label produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyMiss {
    /// Learning recorded no selector for this label.
    EmptySelector,
    /// The selector matched nothing or evaluation failed.
    Unresolved(String),
    /// The element's text holds no numeral.
    NoNumeral(String),
}

/// Resolve one entry against the loaded page.
pub async fn resolve_label(ctx: &dyn RenderContext, entry: &SelectorEntry) -> Result<f64, ApplyMiss> {
    if entry.is_miss() {
        return Err(ApplyMiss::EmptySelector);
    }
    let text = ctx
        .resolve_text(&entry.selector)
        .await
        .map_err(|e| ApplyMiss::Unresolved(format!("{e:#}")))?;
    parse_numeral(&text).ok_or(ApplyMiss::NoNumeral(text))
}

/// Navigate `ctx` to `url` and resolve every label independently.
pub async fn apply_in_context(
    ctx: &mut dyn RenderContext,
    url: &str,
    selectors: &SelectorMap,
    nav_timeout_ms: u64,
) -> SelmapResult<AppliedResult> {
    ctx.navigate(url, nav_timeout_ms)
        .await
        .map_err(|e| SelmapError::Navigation {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })?;

    let mut result = AppliedResult::default();
    for (label, entry) in selectors {
        let value = match resolve_label(&*ctx, entry).await {
            Ok(value) => Some(value),
            Err(miss) => {
                debug!(label = %label, ?miss, "no value");
                None
            }
        };
        result.labels.insert(label.clone(), value);
    }

    let found = result.labels.values().filter(|v| v.is_some()).count();
    info!("Applied {} selectors to {} ({} resolved)", selectors.len(), url, found);
    Ok(result)
}

/// Apply selectors in a fresh rendering session, closing it on every path.
pub async fn apply_selectors(
    renderer: &dyn Renderer,
    url: &str,
    selectors: &SelectorMap,
    nav_timeout_ms: u64,
) -> SelmapResult<AppliedResult> {
    let mut ctx = renderer
        .new_context()
        .await
        .map_err(|e| SelmapError::Render(format!("failed to open session: {e:#}")))?;

    let outcome = apply_in_context(ctx.as_mut(), url, selectors, nav_timeout_ms).await;

    if let Err(e) = ctx.close().await {
        warn!("failed to close session for {}: {:#}", url, e);
    }
    outcome
}
