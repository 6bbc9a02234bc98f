//! Host functions exposed to manifest scripts.
//!
//! `install_bridge` registers the four capabilities a manifest can call
//! (`describe`, `exec`, `env_set`, `env_get`) plus the global `prefix`
//! string, before any user code runs. Arguments validate before any side
//! effect; a bad invocation raises a script-visible error the manifest can
//! observe with `pcall`, and otherwise propagates out of run()/install().
//!
//! "String" at this boundary means string-coercible the way `tostring`
//! coerces: Lua strings and numbers pass, every other type is rejected.

use std::cell::RefCell;
use std::path::Path;
use std::process::{Command, Stdio};
use std::rc::Rc;

use mlua::{Lua, MultiValue, Table, Value};
use tracing::debug;

use crate::description::Description;
use crate::env::EnvOverlay;
use crate::error::RuntimeError;
use crate::sandbox::Sandbox;

// ─── Host state ─────────────────────────────────────────────────────────

/// State the host functions mutate on behalf of a manifest.
///
/// Each manifest owns exactly one of these behind an `Rc<RefCell<_>>`;
/// two manifests never observe each other's writes.
#[derive(Debug, Default)]
pub(crate) struct HostState {
    pub(crate) description: Description,
    pub(crate) env: EnvOverlay,
}

pub(crate) type SharedHostState = Rc<RefCell<HostState>>;

// ─── Registration ───────────────────────────────────────────────────────

/// Register the host functions and the `prefix` global into a sandbox.
pub(crate) fn install_bridge(
    sandbox: &Sandbox,
    prefix: &Path,
    state: SharedHostState,
) -> Result<(), RuntimeError> {
    let lua = sandbox.lua();

    sandbox.set_global_string("prefix", &prefix.to_string_lossy())?;

    // ── describe ──

    let describe_state = Rc::clone(&state);
    let describe = lua.create_function(move |lua, value: Value| {
        let table = match &value {
            Value::Table(table) => table,
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "invalid invocation of describe(), expected table, got {}",
                    other.type_name()
                )))
            }
        };
        let description = Description {
            summary: table_string(lua, table, "summary")?,
            homepage: table_string(lua, table, "homepage")?,
            url: table_string(lua, table, "url")?,
            mirror: table_string(lua, table, "mirror")?,
            sha256: table_string(lua, table, "sha256")?,
        };
        debug!(
            summary = description.summary.as_deref().unwrap_or(""),
            "manifest has been described"
        );
        describe_state.borrow_mut().description = description;
        Ok(())
    })?;
    lua.globals().set("describe", describe)?;

    // ── exec ──

    let exec = lua.create_function(move |lua, args: MultiValue| {
        let values: Vec<Value> = args.into_iter().collect();
        if values.is_empty() {
            return Err(mlua::Error::RuntimeError(
                "invalid invocation of exec(), expected at least 1 argument, got 0".into(),
            ));
        }
        let mut argv = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            match coerce_string(lua, value)? {
                Some(s) => argv.push(s),
                None => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "invalid invocation of exec(), expected all string arguments, \
                         got {} at argument {}",
                        value.type_name(),
                        index + 1
                    )))
                }
            }
        }
        let command = &argv[0];
        let rest = &argv[1..];
        debug!(command = %command, args = ?rest, "exec");

        // The child shares our stdout/stderr; stdin stays closed.
        let status = Command::new(command)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| {
                mlua::Error::RuntimeError(format!("exec() failed to start `{command}`: {err}"))
            })?;
        if !status.success() {
            return Err(mlua::Error::RuntimeError(format!(
                "exec() command `{command}` failed: {status}"
            )));
        }
        Ok(())
    })?;
    lua.globals().set("exec", exec)?;

    // ── env_set ──

    let env_set_state = Rc::clone(&state);
    let env_set = lua.create_function(move |lua, args: MultiValue| {
        let values: Vec<Value> = args.into_iter().collect();
        if values.len() < 2 {
            return Err(mlua::Error::RuntimeError(format!(
                "invalid invocation of env_set(), expected 2 args, got {}",
                values.len()
            )));
        }
        // Both arguments validate before the overlay is touched.
        let key = require_string(lua, "env_set", 1, &values[0])?;
        let value = require_string(lua, "env_set", 2, &values[1])?;
        debug!(key = %key, "env_set");
        env_set_state.borrow_mut().env.set(key, value);
        Ok(())
    })?;
    lua.globals().set("env_set", env_set)?;

    // ── env_get ──

    let env_get_state = Rc::clone(&state);
    let env_get = lua.create_function(move |lua, args: MultiValue| {
        let values: Vec<Value> = args.into_iter().collect();
        if values.len() != 1 {
            return Err(mlua::Error::RuntimeError(format!(
                "invalid invocation of env_get(), expected 1 argument, got {}",
                values.len()
            )));
        }
        let key = match coerce_string(lua, &values[0])? {
            Some(key) => key,
            None => {
                return Err(mlua::Error::RuntimeError(format!(
                    "invalid invocation of env_get(), expected string, got {}",
                    values[0].type_name()
                )))
            }
        };
        Ok(env_get_state.borrow().env.get(&key))
    })?;
    lua.globals().set("env_get", env_get)?;

    Ok(())
}

// ─── Coercion helpers ───────────────────────────────────────────────────

/// `tostring`-style coercion: strings and numbers become `Some`, every
/// other type is `None`.
fn coerce_string(lua: &Lua, value: &Value) -> mlua::Result<Option<String>> {
    Ok(lua
        .coerce_string(value.clone())?
        .map(|s| String::from(s.to_string_lossy())))
}

fn require_string(lua: &Lua, func: &str, index: usize, value: &Value) -> mlua::Result<String> {
    coerce_string(lua, value)?.ok_or_else(|| {
        mlua::Error::RuntimeError(format!(
            "invalid invocation of {func}(), expected string for argument {index}, got {}",
            value.type_name()
        ))
    })
}

/// Table field lookup with string coercion applied to the value. A field
/// holding a non-coercible value is skipped, never defaulted.
fn table_string(lua: &Lua, table: &Table, key: &str) -> mlua::Result<Option<String>> {
    let value: Value = table.get(key)?;
    coerce_string(lua, &value)
}

// ─── Tests ──────────────────────────────────────────────────────────────
