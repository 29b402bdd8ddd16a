//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide, or static HTML served
//! from memory).

pub mod chromium;
pub mod replay;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chromium::{ChromiumRenderer, RenderConfig};
pub use replay::ReplayRenderer;

/// Default navigation timeout.
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken until the network settled, in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait until the network is idle.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Call `script` (a function expression) in the page with one JSON argument.
    async fn evaluate(&self, script: &str, args: serde_json::Value) -> Result<serde_json::Value>;
    /// Trimmed rendered text of the first element matching `selector`.
    ///
    /// Fails when nothing matches.
    async fn resolve_text(&self, selector: &str) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
