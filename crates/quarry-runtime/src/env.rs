//! Per-manifest environment overlay.
//!
//! `env_set` writes land here instead of mutating the real process
//! environment. Lookups check the overlay first and fall back to the
//! ambient process environment, so a manifest sees its own writes shadow
//! whatever the process inherited. The overlay is discarded on reset.

use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    values: HashMap<String, String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key in the overlay, replacing any previous overlay value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Overlay value if set, otherwise the ambient process environment,
    /// otherwise `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        env::var(key).ok()
    }

    /// Overlay-only lookup, never consults the process environment.
    pub fn overlay_get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
