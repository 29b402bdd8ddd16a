//! Learn/apply sequencing for one page or a batch of pages.
//!
//! Each run goes `START → (LEARN?) → STORE_READY → APPLY(each URL) → DONE`.
//! Learning happens when forced or when no template is stored yet; the
//! template is then saved before anything is applied. Pages are processed
//! strictly one after another, each in its own rendering session.

use crate::apply::apply_selectors;
use crate::learn::learn_selectors;
use crate::records::{date_key, UrlRepository};
use crate::renderer::{Renderer, DEFAULT_NAV_TIMEOUT_MS};
use crate::store::SelectorStore;
use crate::types::{
    AppliedResult, DateBucketedRecords, LabelValue, PageRecord, SelectorTemplate, SelmapError,
    SelmapResult,
};
use tracing::{info, warn};

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Re-learn even when a stored template exists.
    pub force_learn: bool,
    pub nav_timeout_ms: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_learn: false,
            nav_timeout_ms: DEFAULT_NAV_TIMEOUT_MS,
        }
    }
}

/// What a single-page run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleRun {
    /// A template was learned and saved during this run.
    pub learned: bool,
    /// `None` when applying was not requested.
    pub applied: Option<AppliedResult>,
}

/// Drives learning and applying against a renderer and a template store.
pub struct Orchestrator<'a> {
    renderer: &'a dyn Renderer,
    store: &'a SelectorStore,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(renderer: &'a dyn Renderer, store: &'a SelectorStore, options: RunOptions) -> Self {
        Self {
            renderer,
            store,
            options,
        }
    }

    /// Whether [`prepare_template`](Self::prepare_template) will learn.
    pub fn needs_learning(&self) -> bool {
        self.options.force_learn || !self.store.exists()
    }

    /// Learn from `reference_url` and save, or load the stored template.
    pub async fn prepare_template(
        &self,
        reference_url: &str,
        labels: &[LabelValue],
    ) -> SelmapResult<SelectorTemplate> {
        if !self.needs_learning() {
            info!("Using stored selectors from {}", self.store.path().display());
            return self.store.load();
        }

        info!("Learning {} labels from {}", labels.len(), reference_url);
        let template =
            learn_selectors(self.renderer, reference_url, labels, self.options.nav_timeout_ms)
                .await?;
        self.store.save(&template)?;
        info!("Saved selectors to {}", self.store.path().display());
        Ok(template)
    }

    /// Learn if needed, then apply to `url` when `apply` is set.
    pub async fn run_single(
        &self,
        url: &str,
        labels: &[LabelValue],
        apply: bool,
    ) -> SelmapResult<SingleRun> {
        let learned = self.needs_learning();
        let template = self.prepare_template(url, labels).await?;
        if !apply {
            return Ok(SingleRun {
                learned,
                applied: None,
            });
        }
        let applied =
            apply_selectors(self.renderer, url, &template.selectors, self.options.nav_timeout_ms)
                .await?;
        Ok(SingleRun {
            learned,
            applied: Some(applied),
        })
    }

    /// Learn from the first URL if needed, then apply to every URL in order.
    ///
    /// A page that fails to load gets an all-null record carrying the error;
    /// the remaining pages are still processed.
    pub async fn run_batch(
        &self,
        repo: &dyn UrlRepository,
        labels: &[LabelValue],
    ) -> SelmapResult<DateBucketedRecords> {
        let urls = repo.urls()?;
        let reference = urls.first().ok_or(SelmapError::EmptyBatch)?;
        let template = self.prepare_template(reference, labels).await?;

        let mut records = DateBucketedRecords::new();
        for (idx, url) in urls.iter().enumerate() {
            info!("[{}/{}] Applying selectors to {}", idx + 1, urls.len(), url);
            let record = match apply_selectors(
                self.renderer,
                url,
                &template.selectors,
                self.options.nav_timeout_ms,
            )
            .await
            {
                Ok(result) => PageRecord {
                    url: url.clone(),
                    labels: result.labels,
                    error: None,
                },
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    PageRecord {
                        url: url.clone(),
                        labels: AppliedResult::all_missing(&template.selectors).labels,
                        error: Some(e.to_string()),
                    }
                }
            };
            records.entry(date_key(url)).or_default().push(record);
        }
        Ok(records)
    }
}
