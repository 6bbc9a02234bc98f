//! Quarry Download Pipeline
//!
//! Cached, verified artifact downloads for the manifest installer. URLs
//! validate before any I/O, bodies stream through a SHA-256 digest on the
//! way to disk, and completed downloads land in a keyed on-disk cache.
//! Everything here is synchronous; one fetch happens at a time.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod verify;

pub use cache::{cache_key, DownloadCache};
pub use config::FetchConfig;
pub use download::{CachePolicy, Download, Downloader};
pub use error::FetchError;
pub use verify::verify_sha256;
