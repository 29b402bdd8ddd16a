//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit flag, then
//! environment variable, then the built-in default.

use selmap::renderer::DEFAULT_NAV_TIMEOUT_MS;
use std::path::PathBuf;

pub const TEMPLATE_ENV: &str = "SELMAP_TEMPLATE";
pub const REPORT_ENV: &str = "SELMAP_REPORT";
pub const OUTPUT_ENV: &str = "SELMAP_OUT";
pub const NAV_TIMEOUT_ENV: &str = "SELMAP_NAV_TIMEOUT_MS";

pub const DEFAULT_TEMPLATE: &str = "selectors_template.json";
pub const DEFAULT_REPORT: &str = "important.txt";
pub const DEFAULT_OUTPUT: &str = "mapped_labels.json";

/// Resolve the selector template path.
pub fn resolve_template_path(explicit: Option<&str>) -> PathBuf {
    resolve_path(explicit, TEMPLATE_ENV, DEFAULT_TEMPLATE)
}

/// Resolve the reference report path.
pub fn resolve_report_path(explicit: Option<&str>) -> PathBuf {
    resolve_path(explicit, REPORT_ENV, DEFAULT_REPORT)
}

/// Resolve the output JSON path.
pub fn resolve_output_path(explicit: Option<&str>) -> PathBuf {
    resolve_path(explicit, OUTPUT_ENV, DEFAULT_OUTPUT)
}

/// Navigation timeout in milliseconds.
pub fn resolve_nav_timeout(explicit: Option<u64>) -> u64 {
    explicit.unwrap_or_else(|| read_env_u64(NAV_TIMEOUT_ENV, DEFAULT_NAV_TIMEOUT_MS))
}

fn resolve_path(explicit: Option<&str>, env_var: &str, default_value: &str) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Some(env_path) = read_env_string(env_var).filter(|p| !p.is_empty()) {
        return PathBuf::from(env_path);
    }

    PathBuf::from(default_value)
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}
