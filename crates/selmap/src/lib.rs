//! selmap: learn where labeled numbers live on a web page, then read them
//! back from the same places on later renders.
//!
//! The learn phase takes reference values parsed from a text report,
//! scores every visible leaf element of the rendered page against each
//! value, and stores a compact structural locator for the winner. The
//! apply phase resolves those locators on a fresh render and reparses the
//! text into numbers, degrading each unresolvable label to `null`.

pub mod apply;
pub mod learn;
pub mod locator;
pub mod orchestrator;
pub mod records;
pub mod renderer;
pub mod report;
pub mod scoring;
pub mod snapshot;
pub mod store;
pub mod types;

pub use apply::{apply_selectors, ApplyMiss};
pub use learn::learn_selectors;
pub use locator::{synthesize, validate_selector, Locator, MAX_SEGMENTS};
pub use orchestrator::{Orchestrator, RunOptions, SingleRun};
pub use records::{date_key, group_by_date, RecordsFile, StaticUrls, UrlRepository};
pub use renderer::{ChromiumRenderer, RenderConfig, RenderContext, Renderer, ReplayRenderer};
pub use report::{extract_labels, read_report, LineSkip, ReportParser};
pub use scoring::{rank_candidates, ScoringTarget, MAX_CANDIDATES};
pub use snapshot::{capture_snapshot, DomSnapshot, LeafElement};
pub use store::{write_batch_output, write_single_output, SelectorStore};
pub use types::*;
