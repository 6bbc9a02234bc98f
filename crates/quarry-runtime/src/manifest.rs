//! Manifest lifecycle.
//!
//! A manifest moves through three states: created, run, installed.
//! `run()` executes the file's top-level body exactly once per lifecycle
//! (the attempt consumes the run even when the chunk fails), `install()`
//! calls the global `install()` function the run defined. `reset()`
//! discards the interpreter, the captured description, and the environment
//! overlay, returning to created.
//!
//! Fetching and verifying the described artifact happens between run and
//! install, but is sequenced by the caller, not here.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::bridge::{self, SharedHostState};
use crate::description::Description;
use crate::error::RuntimeError;
use crate::sandbox::Sandbox;

// ─── State ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestState {
    Created,
    Run,
    Installed,
}

impl ManifestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestState::Created => "created",
            ManifestState::Run => "run",
            ManifestState::Installed => "installed",
        }
    }
}

// ─── Manifest ───────────────────────────────────────────────────────────

/// A manifest file bound to its own interpreter and host state.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    prefix: PathBuf,
    sandbox: Sandbox,
    state: ManifestState,
    host: SharedHostState,
}

impl Manifest {
    /// Bind a manifest file to a fresh runtime.
    ///
    /// The file is not read until [`run`](Self::run); the host functions
    /// and the global `prefix` are installed now so the first run sees
    /// them.
    pub fn new(
        path: impl Into<PathBuf>,
        prefix: impl Into<PathBuf>,
    ) -> Result<Self, RuntimeError> {
        let path = path.into();
        let prefix = prefix.into();
        debug!(manifest = %path.display(), "begin reading and parsing of manifest");
        let (sandbox, host) = build_runtime(&prefix)?;
        Ok(Self {
            path,
            prefix,
            sandbox,
            state: ManifestState::Created,
            host,
        })
    }

    /// Execute the manifest file's top-level body.
    ///
    /// Allowed exactly once per lifecycle. The attempt consumes the run
    /// even when the chunk fails, so a broken manifest cannot be re-run
    /// without [`reset`](Self::reset).
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        if self.state != ManifestState::Created {
            return Err(RuntimeError::AlreadyRun);
        }
        self.state = ManifestState::Run;
        debug!(manifest = %self.path.display(), "beginning initial run of manifest");
        let started = Instant::now();
        let result = self.sandbox.exec_file(&self.path);
        debug!(
            manifest = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "manifest run finished"
        );
        result
    }

    /// Call the global `install()` function defined by the run.
    ///
    /// Fails with a usage error before any run, and with a distinct error
    /// when the manifest never defined `install`. The state advances to
    /// installed only on success.
    pub fn install(&mut self) -> Result<(), RuntimeError> {
        if self.state == ManifestState::Created {
            return Err(RuntimeError::NotRun);
        }
        if !self.sandbox.has_global_function("install")? {
            return Err(RuntimeError::NoInstallFunction(
                self.path.display().to_string(),
            ));
        }
        let started = Instant::now();
        self.sandbox.call_global("install")?;
        self.state = ManifestState::Installed;
        debug!(
            manifest = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "install finished"
        );
        Ok(())
    }

    /// Discard all execution state and return to created.
    ///
    /// Fresh interpreter, empty description, empty overlay; globals from
    /// the previous run are gone.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        let (sandbox, host) = build_runtime(&self.prefix)?;
        self.sandbox = sandbox;
        self.host = host;
        self.state = ManifestState::Created;
        debug!(
            manifest = %self.path.display(),
            state = self.state.as_str(),
            "manifest reset"
        );
        Ok(())
    }

    pub fn state(&self) -> ManifestState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Snapshot of the description captured by the last `describe` call.
    pub fn description(&self) -> Description {
        self.host.borrow().description.clone()
    }

    /// Environment lookup with the overlay-first fallback chain.
    pub fn env_value(&self, key: &str) -> Option<String> {
        self.host.borrow().env.get(key)
    }
}

fn build_runtime(prefix: &Path) -> Result<(Sandbox, SharedHostState), RuntimeError> {
    let sandbox = Sandbox::new();
    let host = SharedHostState::default();
    bridge::install_bridge(&sandbox, prefix, Rc::clone(&host))?;
    Ok((sandbox, host))
}

// ─── Tests ──────────────────────────────────────────────────────────────
