//! Artifact digest verification.

use crate::error::FetchError;

/// Compare a declared SHA-256 digest against a computed one.
///
/// Hex digests compare case-insensitively. A mismatch reports both sides,
/// lowercased.
pub fn verify_sha256(expected: &str, actual: &str) -> Result<(), FetchError> {
    if expected.eq_ignore_ascii_case(actual) {
        return Ok(());
    }
    Err(FetchError::ChecksumMismatch {
        expected: expected.to_ascii_lowercase(),
        actual: actual.to_ascii_lowercase(),
    })
}
