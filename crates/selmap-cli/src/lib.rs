//! selmap command-line front end.

pub mod app;
pub mod config;

pub use app::{run, RunArgs, RunOutcome};
pub use config::{
    resolve_nav_timeout, resolve_output_path, resolve_report_path, resolve_template_path,
};
