//! JSON persistence for selector templates and extraction results.
//!
//! Every write goes to a sibling `.tmp` file first and is renamed into
//! place, so a crash never leaves a half-written template behind.

use crate::locator::validate_selector;
use crate::types::{AppliedResult, DateBucketedRecords, SelectorTemplate, SelmapError, SelmapResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed selector template.
#[derive(Debug, Clone)]
pub struct SelectorStore {
    path: PathBuf,
}

impl SelectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored template.
    ///
    /// Selectors that are not valid CSS are kept, so a later relearn can
    /// replace them, but logged.
    pub fn load(&self) -> SelmapResult<SelectorTemplate> {
        let raw = std::fs::read_to_string(&self.path)?;
        let template: SelectorTemplate = serde_json::from_str(&raw).map_err(|e| {
            SelmapError::Store(format!("malformed template {}: {e}", self.path.display()))
        })?;

        for (label, entry) in &template.selectors {
            if !entry.is_miss() {
                if let Err(e) = validate_selector(&entry.selector) {
                    warn!(label = %label, "stored selector will not resolve: {e}");
                }
            }
        }
        debug!(
            "Loaded {} selectors from {}",
            template.selectors.len(),
            self.path.display()
        );
        Ok(template)
    }

    /// Replace the stored template wholesale.
    pub fn save(&self, template: &SelectorTemplate) -> SelmapResult<()> {
        write_json_atomic(&self.path, template)
    }
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    records: &'a DateBucketedRecords,
}

/// Write `{ "labels": { ... } }`.
pub fn write_single_output(path: &Path, result: &AppliedResult) -> SelmapResult<()> {
    write_json_atomic(path, result)
}

/// Write `{ "records": { date: [ { url, labels }, ... ] } }`.
pub fn write_batch_output(path: &Path, records: &DateBucketedRecords) -> SelmapResult<()> {
    write_json_atomic(path, &BatchOutput { records })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> SelmapResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
