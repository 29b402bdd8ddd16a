//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::js_protocol::runtime::{CallArgument, CallFunctionOnParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long the page must have no request in flight to count as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const RESOLVE_TEXT_SCRIPT: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  return el ? (el.innerText || el.textContent || '').trim() : null;
}"#;

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Explicit Chromium binary; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub headless: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chromium_path: None,
            viewport_width: 1280,
            viewport_height: 4000,
            headless: true,
        }
    }
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SELMAP_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SELMAP_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.selmap/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".selmap/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".selmap/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".selmap/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".selmap/chromium/chrome-linux64/chrome"),
                home.join(".selmap/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch headless Chromium with the default configuration.
    pub async fn new() -> Result<Self> {
        Self::with_config(RenderConfig::default()).await
    }

    /// Launch Chromium with custom configuration.
    pub async fn with_config(config: RenderConfig) -> Result<Self> {
        let chrome_path = match config.chromium_path.clone() {
            Some(path) => path,
            None => find_chromium()
                .context("Chromium not found. Set SELMAP_CHROMIUM_PATH or install Chrome.")?,
        };

        info!(
            "Launching Chromium {} (headless: {}, viewport: {}x{})",
            chrome_path.display(),
            config.headless,
            config.viewport_width,
            config.viewport_height
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Viewport::default()
            })
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

/// Request lifecycle notification from the page's network domain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkEvent {
    Started(String),
    Finished(String),
}

/// Tracks in-flight requests by CDP request id.
///
/// A redirect reuses its request id, so it stays one entry until the final
/// response finishes or fails.
#[derive(Debug)]
struct NetworkTracker {
    in_flight: HashSet<String>,
    quiet_since: Option<Instant>,
}

impl NetworkTracker {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            quiet_since: Some(now),
        }
    }

    fn started(&mut self, request_id: String) {
        self.in_flight.insert(request_id);
        self.quiet_since = None;
    }

    /// Unknown ids (requests issued before tracking began) are ignored.
    fn finished(&mut self, request_id: &str, now: Instant) {
        if self.in_flight.remove(request_id) && self.in_flight.is_empty() {
            self.quiet_since = Some(now);
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= NETWORK_QUIET)
    }

    /// When the page turns idle if nothing else happens.
    fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + NETWORK_QUIET)
    }

    fn apply(&mut self, event: NetworkEvent, now: Instant) {
        match event {
            NetworkEvent::Started(id) => self.started(id),
            NetworkEvent::Finished(id) => self.finished(&id, now),
        }
    }
}

/// Subscribe to request start, finish and failure events of `page`.
async fn network_events(page: &Page) -> Result<impl Stream<Item = NetworkEvent> + Unpin> {
    let started = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .context("failed to listen for requests")?
        .map(|e| NetworkEvent::Started(e.request_id.inner().clone()));
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .context("failed to listen for finished loads")?
        .map(|e| NetworkEvent::Finished(e.request_id.inner().clone()));
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .context("failed to listen for failed loads")?
        .map(|e| NetworkEvent::Finished(e.request_id.inner().clone()));
    Ok(futures::stream::select(started, futures::stream::select(finished, failed)))
}

/// Wait until no request has been in flight for [`NETWORK_QUIET`], or
/// until `deadline`. Returns whether the network settled.
async fn wait_for_network_idle<S>(
    events: &mut S,
    tracker: &mut NetworkTracker,
    deadline: Instant,
) -> bool
where
    S: Stream<Item = NetworkEvent> + Unpin,
{
    loop {
        let now = Instant::now();
        if tracker.is_idle(now) {
            return true;
        }
        if now >= deadline {
            return false;
        }

        let wake = tokio::time::Instant::from_std(
            tracker.idle_at().map_or(deadline, |at| at.min(deadline)),
        );
        tokio::select! {
            event = events.next() => match event {
                Some(event) => tracker.apply(event, Instant::now()),
                None => tokio::time::sleep_until(wake).await,
            },
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(timeout_ms);
        debug!("Navigating to {}", url);

        let mut events = network_events(&self.page).await?;
        let mut tracker = NetworkTracker::new(start);

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }

        if !wait_for_network_idle(&mut events, &mut tracker, deadline).await {
            warn!(
                "{} requests still in flight at timeout, continuing",
                tracker.in_flight()
            );
        }

        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        let load_time_ms = start.elapsed().as_millis() as u64;
        info!("Loaded {} in {}ms", final_url, load_time_ms);

        Ok(NavigationResult {
            final_url,
            load_time_ms,
        })
    }

    async fn evaluate(&self, script: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let params = CallFunctionOnParams::builder()
            .function_declaration(script)
            .argument(CallArgument::builder().value(args).build())
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(|e| anyhow!("failed to build function call: {e}"))?;

        let result = self
            .page
            .evaluate_function(params)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn resolve_text(&self, selector: &str) -> Result<String> {
        let value = self
            .evaluate(RESOLVE_TEXT_SCRIPT, serde_json::Value::String(selector.to_string()))
            .await?;
        match value {
            serde_json::Value::String(text) => Ok(text),
            _ => bail!("no element matches {selector}"),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{capture_snapshot, DEFAULT_MAX_DEPTH};

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert!(config.headless);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.viewport_height, 4000);
        assert!(config.chromium_path.is_none());
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_slow_request_keeps_page_busy() {
        let t0 = Instant::now();
        let mut tracker = NetworkTracker::new(t0);
        tracker.started("doc".into());
        tracker.finished("doc", t0 + ms(50));
        tracker.started("slow-xhr".into());

        // Nothing new is requested, but the slow request is still open.
        assert!(!tracker.is_idle(t0 + ms(5_000)));
        assert_eq!(tracker.idle_at(), None);

        tracker.finished("slow-xhr", t0 + ms(6_000));
        assert!(!tracker.is_idle(t0 + ms(6_499)));
        assert!(tracker.is_idle(t0 + ms(6_500)));
        assert_eq!(tracker.idle_at(), Some(t0 + ms(6_500)));
    }

    #[test]
    fn test_failed_request_counts_as_finished() {
        let t0 = Instant::now();
        let mut tracker = NetworkTracker::new(t0);
        tracker.apply(NetworkEvent::Started("a".into()), t0);
        tracker.apply(NetworkEvent::Started("b".into()), t0);
        tracker.apply(NetworkEvent::Finished("a".into()), t0 + ms(10));
        assert_eq!(tracker.in_flight(), 1);
        assert!(!tracker.is_idle(t0 + ms(600)));

        // Loading failure for "b" arrives on the same path as a finish.
        tracker.apply(NetworkEvent::Finished("b".into()), t0 + ms(20));
        assert!(tracker.is_idle(t0 + ms(520)));
    }

    #[test]
    fn test_redirect_and_unknown_ids() {
        let t0 = Instant::now();
        let mut tracker = NetworkTracker::new(t0);
        tracker.started("r1".into());
        tracker.started("r1".into());
        assert_eq!(tracker.in_flight(), 1);

        tracker.finished("stale", t0 + ms(10));
        assert!(!tracker.is_idle(t0 + ms(1_000)));

        tracker.finished("r1", t0 + ms(20));
        assert_eq!(tracker.in_flight(), 0);
        assert!(tracker.is_idle(t0 + ms(520)));
    }

    #[tokio::test]
    async fn test_wait_settles_after_quiet_window() {
        let start = Instant::now();
        let mut tracker = NetworkTracker::new(start);
        let mut events = futures::stream::iter(vec![
            NetworkEvent::Started("doc".into()),
            NetworkEvent::Finished("doc".into()),
        ]);
        let settled =
            wait_for_network_idle(&mut events, &mut tracker, start + ms(5_000)).await;
        assert!(settled);
        assert!(start.elapsed() >= NETWORK_QUIET);
        assert!(start.elapsed() < ms(5_000));
    }

    #[tokio::test]
    async fn test_wait_gives_up_at_deadline_with_open_request() {
        let start = Instant::now();
        let mut tracker = NetworkTracker::new(start);
        let mut events =
            futures::stream::iter(vec![NetworkEvent::Started("hanging".into())])
                .chain(futures::stream::pending());
        let settled =
            wait_for_network_idle(&mut events, &mut tracker, start + ms(300)).await;
        assert!(!settled);
        assert_eq!(tracker.in_flight(), 1);
        assert!(start.elapsed() >= ms(300));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_snapshot_and_resolve() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        ctx.navigate(
            "data:text/html,<div><span>Weight</span><span id='w'>62.5</span></div>",
            10000,
        )
        .await
        .expect("navigation failed");

        let snapshot = capture_snapshot(ctx.as_ref(), DEFAULT_MAX_DEPTH)
            .await
            .expect("snapshot failed");
        assert_eq!(snapshot.leaves.len(), 2);
        assert!(snapshot.leaves[1].id_unique);

        let text = ctx.resolve_text("#w").await.expect("resolve failed");
        assert_eq!(text, "62.5");
        assert!(ctx.resolve_text("#missing").await.is_err());

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }
}
