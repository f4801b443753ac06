//! Centralized path functions for all app storage locations.
//!
//! Single source of truth — avoids ad-hoc `dirs::cache_dir().join(...)` scattered across crates.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/rlm/` (macOS) or `~/.cache/rlm/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("rlm"))
}

/// Default inverted-index file path: `<app_cache_dir>/index.json`.
///
/// Overridable via `Config::index_path` / `RLM_INDEX_PATH`.
pub fn default_index_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("index.json"))
}

/// Default evaluation-report output path: `<app_cache_dir>/eval-report.json`.
pub fn default_report_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("eval-report.json"))
}
