//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.coachline/config.json`) and
//! environment. Kept minimal: base address, timeouts, poll interval, and the
//! wire-log switch.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level client config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// API base address. Overridden by COACHLINE_BASE_URL env when set.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for the binary attachment upload (large payloads).
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Seconds between background conversation fetches.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// When true, the transport logs request lines, statuses, and failures.
    /// Observability only; never affects control flow.
    #[serde(default)]
    pub wire_log: bool,
}

fn default_base_url() -> String {
    "https://api.coachline.app".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_upload_timeout_ms() -> u64 {
    120_000
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            wire_log: false,
        }
    }
}

/// Resolve the base address: env COACHLINE_BASE_URL overrides config.
pub fn resolve_base_url(config: &Config) -> String {
    std::env::var("COACHLINE_BASE_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.base_url.clone())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("COACHLINE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".coachline").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Credentials live next to the config file.
pub fn credentials_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("credentials.json")
}

/// Load config from the default path (or COACHLINE_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = Config::default();
        assert_eq!(c.request_timeout_ms, 15_000);
        assert_eq!(c.upload_timeout_ms, 120_000);
        assert_eq!(c.poll_interval_secs, 60);
        assert!(!c.wire_log);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let c: Config = serde_json::from_str(r#"{"baseUrl":"http://localhost:9000"}"#)
            .expect("parse");
        assert_eq!(c.base_url, "http://localhost:9000");
        assert_eq!(c.request_timeout_ms, 15_000);
    }

    #[test]
    fn credentials_path_is_sibling_of_config() {
        let path = Path::new("/home/user/.coachline/config.json");
        assert_eq!(
            credentials_path(path),
            PathBuf::from("/home/user/.coachline/credentials.json")
        );
    }
}
