//! Typed configuration, layered defaults → `rlm.toml` → `RLM_*` env vars.
//!
//! Mirrors every budget and default named across the retrieval pipeline so
//! none of it is hardcoded deep in `rlm-index`/`rlm-expand`/`rlm-maintainer` —
//! a single struct is threaded through at startup instead.

use crate::error::ConfigError;
use crate::types::RecursiveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tier 2's coarse-ranking candidate cap.
const DEFAULT_TIER2_CANDIDATES: usize = 40;

/// Tier 3 content-scan caps, in words, by source kind.
const DEFAULT_TIER3_SCAN_MEMORY: usize = 2000;
const DEFAULT_TIER3_SCAN_SESSION: usize = 1000;
const DEFAULT_TIER3_SCAN_OTHER: usize = 500;

/// Index Maintainer debounce/cooldown/queue bounds.
const DEFAULT_MAINTAINER_DEBOUNCE_SECS: u64 = 5;
const DEFAULT_MAINTAINER_COOLDOWN_SECS: u64 = 30;
const DEFAULT_MAINTAINER_LOCK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAINTAINER_QUEUE_CAP: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub tier2_candidates: usize,
    pub tier3_scan_memory_words: usize,
    pub tier3_scan_session_words: usize,
    pub tier3_scan_other_words: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tier2_candidates: DEFAULT_TIER2_CANDIDATES,
            tier3_scan_memory_words: DEFAULT_TIER3_SCAN_MEMORY,
            tier3_scan_session_words: DEFAULT_TIER3_SCAN_SESSION,
            tier3_scan_other_words: DEFAULT_TIER3_SCAN_OTHER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintainerConfig {
    pub debounce_secs: u64,
    pub cooldown_secs: u64,
    pub lock_timeout_secs: u64,
    pub queue_capacity: usize,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            debounce_secs: DEFAULT_MAINTAINER_DEBOUNCE_SECS,
            cooldown_secs: DEFAULT_MAINTAINER_COOLDOWN_SECS,
            lock_timeout_secs: DEFAULT_MAINTAINER_LOCK_TIMEOUT_SECS,
            queue_capacity: DEFAULT_MAINTAINER_QUEUE_CAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandConfig {
    pub max_refs: usize,
    pub default_lines: usize,
    pub max_chars_per_ref: usize,
    pub max_total_expanded_chars: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            max_refs: 50,
            default_lines: 20,
            max_chars_per_ref: 8000,
            max_total_expanded_chars: 12_000,
        }
    }
}

/// Root configuration, assembled by [`Config::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub workspace_root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,
    pub server_port: u16,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub maintainer: MaintainerConfig,
    #[serde(default)]
    pub expand: ExpandConfig,
    #[serde(default)]
    pub recursive: RecursiveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            index_path: None,
            server_port: 8787,
            index: IndexConfig::default(),
            maintainer: MaintainerConfig::default(),
            expand: ExpandConfig::default(),
            recursive: RecursiveConfig::default(),
        }
    }
}

/// On-disk `rlm.toml` shape: every field optional, since any subset may be
/// overridden and the rest fall through to built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomlConfig {
    workspace_root: Option<PathBuf>,
    index_path: Option<PathBuf>,
    server_port: Option<u16>,
    #[serde(default)]
    index: TomlIndexConfig,
    #[serde(default)]
    maintainer: TomlMaintainerConfig,
    #[serde(default)]
    expand: TomlExpandConfig,
    #[serde(default)]
    recursive: TomlRecursiveConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomlIndexConfig {
    tier2_candidates: Option<usize>,
    tier3_scan_memory_words: Option<usize>,
    tier3_scan_session_words: Option<usize>,
    tier3_scan_other_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomlMaintainerConfig {
    debounce_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    lock_timeout_secs: Option<u64>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomlExpandConfig {
    max_refs: Option<usize>,
    default_lines: Option<usize>,
    max_chars_per_ref: Option<usize>,
    max_total_expanded_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomlRecursiveConfig {
    enabled: Option<bool>,
    max_hops: Option<u32>,
    max_refs_per_hop: Option<usize>,
    expand_top_k: Option<usize>,
    default_lines: Option<usize>,
    max_chars_per_ref: Option<usize>,
    max_total_expanded_chars: Option<usize>,
    derived_query_max_terms: Option<usize>,
    early_stop: Option<bool>,
}

impl Config {
    /// Load defaults, then overlay `rlm.toml` at `config_path` if present,
    /// then overlay `RLM_*` environment variables. A missing config file is
    /// not an error — it means "use built-in defaults".
    pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
        let mut cfg = Config::default();

        if config_path.exists() {
            let text =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;
            let toml_cfg: TomlConfig =
                toml::from_str(&text).map_err(|e| ConfigError::Toml {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;
            cfg.apply_toml(toml_cfg);
        }

        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_toml(&mut self, t: TomlConfig) {
        if let Some(v) = t.workspace_root {
            self.workspace_root = v;
        }
        if let Some(v) = t.index_path {
            self.index_path = Some(v);
        }
        if let Some(v) = t.server_port {
            self.server_port = v;
        }

        let i = t.index;
        if let Some(v) = i.tier2_candidates {
            self.index.tier2_candidates = v;
        }
        if let Some(v) = i.tier3_scan_memory_words {
            self.index.tier3_scan_memory_words = v;
        }
        if let Some(v) = i.tier3_scan_session_words {
            self.index.tier3_scan_session_words = v;
        }
        if let Some(v) = i.tier3_scan_other_words {
            self.index.tier3_scan_other_words = v;
        }

        let m = t.maintainer;
        if let Some(v) = m.debounce_secs {
            self.maintainer.debounce_secs = v;
        }
        if let Some(v) = m.cooldown_secs {
            self.maintainer.cooldown_secs = v;
        }
        if let Some(v) = m.lock_timeout_secs {
            self.maintainer.lock_timeout_secs = v;
        }
        if let Some(v) = m.queue_capacity {
            self.maintainer.queue_capacity = v;
        }

        let e = t.expand;
        if let Some(v) = e.max_refs {
            self.expand.max_refs = v;
        }
        if let Some(v) = e.default_lines {
            self.expand.default_lines = v;
        }
        if let Some(v) = e.max_chars_per_ref {
            self.expand.max_chars_per_ref = v;
        }
        if let Some(v) = e.max_total_expanded_chars {
            self.expand.max_total_expanded_chars = v;
        }

        let r = t.recursive;
        if let Some(v) = r.enabled {
            self.recursive.enabled = v;
        }
        if let Some(v) = r.max_hops {
            self.recursive.max_hops = v;
        }
        if let Some(v) = r.max_refs_per_hop {
            self.recursive.max_refs_per_hop = v;
        }
        if let Some(v) = r.expand_top_k {
            self.recursive.expand_top_k = v;
        }
        if let Some(v) = r.default_lines {
            self.recursive.default_lines = v;
        }
        if let Some(v) = r.max_chars_per_ref {
            self.recursive.max_chars_per_ref = v;
        }
        if let Some(v) = r.max_total_expanded_chars {
            self.recursive.max_total_expanded_chars = v;
        }
        if let Some(v) = r.derived_query_max_terms {
            self.recursive.derived_query_max_terms = v;
        }
        if let Some(v) = r.early_stop {
            self.recursive.early_stop = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("RLM_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RLM_INDEX_PATH") {
            self.index_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("RLM_SERVER_PORT") {
            self.server_port = parse_env("RLM_SERVER_PORT", &v)?;
        }
        if let Ok(v) = std::env::var("RLM_RECURSIVE_ENABLED") {
            self.recursive.enabled = parse_env("RLM_RECURSIVE_ENABLED", &v)?;
        }
        if let Ok(v) = std::env::var("RLM_RECURSIVE_MAX_HOPS") {
            self.recursive.max_hops = parse_env("RLM_RECURSIVE_MAX_HOPS", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::OutOfRange {
                field: "serverPort".into(),
                reason: "must be nonzero".into(),
            });
        }
        if self.recursive.max_hops > 8 {
            return Err(ConfigError::OutOfRange {
                field: "recursive.maxHops".into(),
                reason: "must be <= 8".into(),
            });
        }
        if self.index.tier2_candidates == 0 {
            return Err(ConfigError::OutOfRange {
                field: "index.tier2Candidates".into(),
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvVar {
        name: name.into(),
        value: value.into(),
        reason: format!("expected a valid {}", std::any::type_name::<T>()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/rlm.toml")).unwrap();
        assert_eq!(cfg.server_port, 8787);
        assert_eq!(cfg.recursive.max_hops, 1);
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "serverPort = 9090").unwrap();
        writeln!(f, "[recursive]").unwrap();
        writeln!(f, "enabled = true").unwrap();
        writeln!(f, "maxHops = 3").unwrap();
        f.flush().unwrap();

        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.server_port, 9090);
        assert!(cfg.recursive.enabled);
        assert_eq!(cfg.recursive.max_hops, 3);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.index.tier2_candidates, 40);
    }

    #[test]
    fn env_overrides_toml_and_defaults() {
        std::env::set_var("RLM_SERVER_PORT", "1234");
        let cfg = Config::load(Path::new("/nonexistent/rlm.toml")).unwrap();
        std::env::remove_var("RLM_SERVER_PORT");
        assert_eq!(cfg.server_port, 1234);
    }

    #[test]
    fn invalid_env_var_is_rejected() {
        std::env::set_var("RLM_SERVER_PORT", "not-a-number");
        let err = Config::load(Path::new("/nonexistent/rlm.toml")).unwrap_err();
        std::env::remove_var("RLM_SERVER_PORT");
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "serverPort = 0").unwrap();
        f.flush().unwrap();

        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "this is not = = valid toml").unwrap();
        f.flush().unwrap();

        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
