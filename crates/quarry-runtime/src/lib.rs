//! Quarry Manifest Runtime
//!
//! Lua-based manifest runtime using an embedded interpreter per manifest.
//! A manifest's top-level body declares artifact metadata with
//! `describe{...}`; its global `install()` function performs the
//! installation through host functions (`exec`, `env_set`, `env_get`) with
//! the install prefix exposed as the global `prefix`. Host state is owned
//! per manifest, never shared.

mod bridge;

pub mod description;
pub mod env;
pub mod error;
pub mod manifest;
pub mod sandbox;

pub use description::{Description, DESCRIBE_KEYS};
pub use env::EnvOverlay;
pub use error::RuntimeError;
pub use manifest::{Manifest, ManifestState};
pub use sandbox::Sandbox;
