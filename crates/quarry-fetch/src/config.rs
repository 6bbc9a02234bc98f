//! Fetch configuration.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the download pipeline.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Quarry root directory; manifests see this as the global `prefix`.
    pub root: PathBuf,
    /// Download cache directory, `<root>/cache`.
    pub cache_dir: PathBuf,
    /// Global HTTP timeout (default: 30s).
    pub timeout: Duration,
}

impl FetchConfig {
    /// Build config from environment variables.
    ///
    /// `QUARRY_HOME` overrides the root (default `$HOME/.quarry`);
    /// `QUARRY_HTTP_TIMEOUT_SECS` overrides the HTTP timeout.
    pub fn from_env() -> Self {
        let root = std::env::var("QUARRY_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".quarry")))
            .unwrap_or_else(|| PathBuf::from(".quarry"));
        let timeout_secs = std::env::var("QUARRY_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            cache_dir: root.join("cache"),
            root,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Same layout rooted at an explicit directory instead of the
    /// environment.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("cache"),
            root,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
