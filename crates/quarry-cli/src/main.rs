//! The `quarry` binary: run a manifest, fetch and verify its artifact,
//! then install it.
//!
//! Diagnostics go to stderr; stdout belongs to the processes a manifest
//! spawns through `exec` (and to the `--dry-run` description dump). The
//! exit code is 0 on full success and 1 on any failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use quarry_fetch::{CachePolicy, Downloader, FetchConfig, FetchError};
use quarry_runtime::{Manifest, RuntimeError};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Parser)]
#[command(name = "quarry", version, about = "Manifest-driven package installer")]
struct Cli {
    /// Path to the manifest file.
    manifest: PathBuf,

    /// Skip the download cache entirely.
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// Re-download even when a cached copy exists (ignored with --no-cache).
    #[arg(long, default_value_t = false)]
    refresh: bool,

    /// Run, download, and verify, but do not install. Prints the captured
    /// description as JSON.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false)]
    trace: bool,
}

#[derive(Error, Debug)]
enum InstallError {
    #[error("manifest declared no url: {0}")]
    MissingUrl(String),

    #[error("manifest declared no sha256, refusing to install unverified: {0}")]
    MissingChecksum(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(manifest = %cli.manifest.display(), error = %err, "installation failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QUARRY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// The install sequence: run the manifest, fetch the described artifact,
/// verify its digest, call install(). Any failure aborts; nothing retries.
fn run(cli: &Cli) -> Result<(), InstallError> {
    let config = FetchConfig::from_env();
    let mut manifest = Manifest::new(&cli.manifest, &config.root)?;
    manifest.run()?;

    let description = manifest.description();
    let url = description
        .url
        .clone()
        .ok_or_else(|| InstallError::MissingUrl(cli.manifest.display().to_string()))?;

    let dest = prepare_workdir()?;
    let downloader = Downloader::new(&config);
    let policy = cache_policy(cli.no_cache, cli.refresh);
    let download =
        downloader.fetch_with_mirror(&url, description.mirror.as_deref(), &dest, policy)?;
    debug!(
        sha256 = %download.sha256,
        from_cache = download.from_cache,
        "artifact downloaded"
    );

    let expected = description
        .sha256
        .as_deref()
        .ok_or_else(|| InstallError::MissingChecksum(cli.manifest.display().to_string()))?;
    quarry_fetch::verify_sha256(expected, &download.sha256)?;
    info!(manifest = %cli.manifest.display(), sha256 = %download.sha256, "artifact verified");

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&description)?);
        info!("dry run, skipping install");
        return Ok(());
    }

    manifest.install()?;
    info!(manifest = %cli.manifest.display(), "install complete");
    Ok(())
}

fn cache_policy(no_cache: bool, refresh: bool) -> CachePolicy {
    if no_cache {
        CachePolicy::Bypass
    } else {
        CachePolicy::Use { refresh }
    }
}

/// Recreate the download workdir relative to the invocation directory and
/// return the artifact destination `tmp/dl`.
///
/// Install functions rely on finding the artifact at that path, so a
/// leftover from a previous run is removed first.
fn prepare_workdir() -> Result<PathBuf, InstallError> {
    let workdir = Path::new("tmp");
    std::fs::create_dir_all(workdir)?;
    let dest = workdir.join("dl");
    if dest.is_dir() {
        std::fs::remove_dir_all(&dest)?;
    } else if dest.exists() {
        std::fs::remove_file(&dest)?;
    }
    Ok(dest)
}
