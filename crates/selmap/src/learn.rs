//! Learn phase: find where each reference value lives on a page.

use crate::renderer::{RenderContext, Renderer};
use crate::scoring::{rank_candidates, ScoringTarget};
use crate::snapshot::{capture_snapshot, DEFAULT_MAX_DEPTH};
use crate::types::{LabelValue, SelectorEntry, SelectorMap, SelectorTemplate, SelmapError, SelmapResult};
use tracing::{debug, info, warn};

/// Learn one selector per label on the page already open in `ctx`.
///
/// The page is navigated to once and enumerated once; every label is scored
/// against the same snapshot. Labels with no candidate get an empty
/// selector so the miss stays visible in the template.
pub async fn learn_in_context(
    ctx: &mut dyn RenderContext,
    url: &str,
    labels: &[LabelValue],
    nav_timeout_ms: u64,
) -> SelmapResult<SelectorTemplate> {
    ctx.navigate(url, nav_timeout_ms)
        .await
        .map_err(|e| SelmapError::Navigation {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })?;

    let snapshot = capture_snapshot(&*ctx, DEFAULT_MAX_DEPTH).await?;
    debug!(leaves = snapshot.leaves.len(), "captured page snapshot");

    let mut selectors = SelectorMap::new();
    for lv in labels {
        let ranked = rank_candidates(&snapshot, ScoringTarget::from(lv));
        let entry = match ranked.first() {
            Some(best) if !best.path.is_empty() => {
                debug!(
                    label = %lv.label,
                    selector = %best.path,
                    score = best.score,
                    tier = ?best.tier,
                    "learned selector"
                );
                SelectorEntry::found(best.path.clone(), lv.value_str.clone())
            }
            _ => {
                debug!(label = %lv.label, value = %lv.value_str, "no candidate found");
                SelectorEntry::missing(lv.value_str.clone())
            }
        };
        // Later lines with the same label win.
        selectors.insert(lv.label.clone(), entry);
    }

    let misses = selectors.values().filter(|e| e.is_miss()).count();
    info!(
        "Learned {} selectors from {} ({} not found)",
        selectors.len() - misses,
        url,
        misses
    );

    Ok(SelectorTemplate {
        url: url.to_string(),
        selectors,
    })
}

/// Learn selectors in a fresh rendering session, closing it on every path.
pub async fn learn_selectors(
    renderer: &dyn Renderer,
    url: &str,
    labels: &[LabelValue],
    nav_timeout_ms: u64,
) -> SelmapResult<SelectorTemplate> {
    let mut ctx = renderer
        .new_context()
        .await
        .map_err(|e| SelmapError::Render(format!("failed to open session: {e:#}")))?;

    let outcome = learn_in_context(ctx.as_mut(), url, labels, nav_timeout_ms).await;

    if let Err(e) = ctx.close().await {
        warn!("failed to close session for {}: {:#}", url, e);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::ReplayRenderer;
    use crate::report::extract_labels;

    const PAGE: &str = r#"<body><ul>
        <li>Weight <span class="value">62.5</span></li>
        <li>Height <span class="value">171.0</span></li>
      </ul></body>"#;

    #[tokio::test]
    async fn test_learns_and_records_misses() {
        let renderer = ReplayRenderer::new().with_page("https://r.test/1", PAGE);
        let labels = extract_labels("Weight: 62.5 kg\nHeight: 171.0 cm\nBMI: 21.3\n");

        let template = learn_selectors(&renderer, "https://r.test/1", &labels, 1000)
            .await
            .unwrap();

        assert_eq!(template.url, "https://r.test/1");
        assert_eq!(template.selectors.len(), 3);
        assert_eq!(
            template.selectors["Weight"].selector,
            "ul:nth-of-type(1) > li:nth-of-type(1) > span.value:nth-of-type(1)"
        );
        assert_eq!(
            template.selectors["Height"].selector,
            "ul:nth-of-type(1) > li:nth-of-type(2) > span.value:nth-of-type(1)"
        );
        let bmi = &template.selectors["BMI"];
        assert!(bmi.is_miss());
        assert_eq!(bmi.expect, "21.3");
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_label_last_wins() {
        let renderer = ReplayRenderer::new().with_page("https://r.test/1", PAGE);
        let labels = extract_labels("Weight: 62.5\nWeight: 171.0\n");

        let template = learn_selectors(&renderer, "https://r.test/1", &labels, 1000)
            .await
            .unwrap();

        assert_eq!(template.selectors.len(), 1);
        assert_eq!(template.selectors["Weight"].expect, "171.0");
        assert!(template.selectors["Weight"].selector.contains("li:nth-of-type(2)"));
    }

    #[tokio::test]
    async fn test_navigation_failure_closes_session() {
        let renderer = ReplayRenderer::new();
        let labels = extract_labels("Weight: 62.5\n");

        let err = learn_selectors(&renderer, "https://down.test/", &labels, 1000)
            .await
            .unwrap_err();

        assert!(matches!(err, SelmapError::Navigation { .. }));
        assert_eq!(renderer.active_contexts(), 0);
        assert_eq!(renderer.opened_contexts(), 1);
    }
}
