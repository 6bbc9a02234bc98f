//! Download pipeline error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme `{scheme}` for {url}")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("HTTP {code} for {url}")]
    Status { code: u16, url: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
