//! Captured artifact metadata.
//!
//! A manifest declares what it installs by calling `describe{...}` from its
//! top-level body. Only the keys below are recognized; anything else in the
//! table is dropped. Every field is optional, absence means the manifest
//! did not provide it.

use serde::{Deserialize, Serialize};

/// Keys recognized by `describe`, in the order manifests conventionally
/// list them.
pub const DESCRIBE_KEYS: [&str; 5] = ["summary", "homepage", "url", "mirror", "sha256"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// One-line summary of the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Project homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Primary artifact URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Fallback URL tried when the primary fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,

    /// Expected SHA-256 digest of the artifact, lowercase hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Description {
    /// True when no key has been provided at all.
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.homepage.is_none()
            && self.url.is_none()
            && self.mirror.is_none()
            && self.sha256.is_none()
    }
}
