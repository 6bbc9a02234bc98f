//! Keyed download cache.
//!
//! Entries live at `<cache_dir>/<key>/artifact` where the key is a
//! normalized form of the source URI. Writes go through a temp file in
//! the entry directory followed by a rename, so a crash mid-write never
//! leaves a partial entry behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::FetchError;

/// Filename of the payload inside a key directory.
const ENTRY_FILE: &str = "artifact";

/// Normalize a URI into a cache key.
///
/// Operates on bytes: uppercase ASCII is lowercased, and every byte
/// outside `[a-z0-9]` becomes `-`. Idempotent, and case variants of the
/// same URI share a key.
pub fn cache_key(uri: &str) -> String {
    uri.bytes()
        .map(|b| {
            let b = b.to_ascii_lowercase();
            if b.is_ascii_lowercase() || b.is_ascii_digit() {
                b as char
            } else {
                '-'
            }
        })
        .collect()
}

/// On-disk cache of previously downloaded artifacts, keyed by URI.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    cache_dir: PathBuf,
}

impl DownloadCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path the entry for `uri` lives at, whether or not it exists.
    pub fn entry_path(&self, uri: &str) -> PathBuf {
        self.cache_dir.join(cache_key(uri)).join(ENTRY_FILE)
    }

    /// Path of the cached entry, if one exists.
    pub fn lookup(&self, uri: &str) -> Option<PathBuf> {
        let path = self.entry_path(uri);
        path.is_file().then_some(path)
    }

    /// Store a copy of `source` as the entry for `uri`, atomically.
    pub fn store(&self, uri: &str, source: &Path) -> Result<PathBuf, FetchError> {
        let entry = self.entry_path(uri);
        let dir = entry
            .parent()
            .ok_or_else(|| FetchError::Io(io::Error::other("cache entry has no parent")))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut src = fs::File::open(source)?;
        io::copy(&mut src, &mut tmp)?;
        tmp.persist(&entry).map_err(|e| FetchError::Io(e.error))?;

        debug!(key = %cache_key(uri), "stored cache entry");
        Ok(entry)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
