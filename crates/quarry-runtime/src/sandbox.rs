//! Embedded Lua sandbox for manifest execution.
//!
//! Each manifest gets its own interpreter instance with the standard
//! libraries open. The wrapper exposes the narrow surface the runtime
//! needs: execute a chunk's top-level body, set a global string, look up
//! and call a global function. Interpreter types stay inside this crate.

use std::path::Path;

use mlua::{Function, Lua, Value};

use crate::error::RuntimeError;

/// An embedded interpreter instance hosting one manifest.
pub struct Sandbox {
    lua: Lua,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox").finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Fresh interpreter with the standard libraries open.
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    /// Set a global string visible to every chunk run afterwards.
    pub fn set_global_string(&self, name: &str, value: &str) -> Result<(), RuntimeError> {
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Read a file and execute its top-level body.
    ///
    /// The chunk is named after the file so script errors point at the
    /// manifest path.
    pub fn exec_file(&self, path: &Path) -> Result<(), RuntimeError> {
        let source = std::fs::read_to_string(path)?;
        self.exec_chunk(&source, &format!("@{}", path.display()))
    }

    /// Execute a chunk's top-level body under the given chunk name.
    pub fn exec_chunk(&self, source: &str, name: &str) -> Result<(), RuntimeError> {
        self.lua.load(source).set_name(name).exec()?;
        Ok(())
    }

    /// Whether a global with the given name exists and is a function.
    pub fn has_global_function(&self, name: &str) -> Result<bool, RuntimeError> {
        let value: Value = self.lua.globals().get(name)?;
        Ok(matches!(value, Value::Function(_)))
    }

    /// Look up a global function and call it with no arguments.
    ///
    /// Script errors raised by the function propagate as
    /// [`RuntimeError::Script`].
    pub fn call_global(&self, name: &str) -> Result<(), RuntimeError> {
        let function: Function = self.lua.globals().get(name)?;
        function.call::<()>(())?;
        Ok(())
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
