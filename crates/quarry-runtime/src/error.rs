//! Manifest runtime error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("manifest has already been run, call reset() and run again")]
    AlreadyRun,

    #[error("manifest MUST be run to know how to install")]
    NotRun,

    #[error("manifest does not define an install() function: {0}")]
    NoInstallFunction(String),

    #[error("script error: {0}")]
    Script(#[from] mlua::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
