#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Process-wide configuration read from the environment (and `.env`).

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::Client;

/// Default per-call execution deadline, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// Default number of students between report checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 25;

/// Runtime configuration shared across the crate.
pub struct ConfigState {
    /// Deadline for loading a program and for each test statement.
    timeout:          Duration,
    /// Number of students graded concurrently.
    workers:          usize,
    /// Python interpreter override.
    python:           Option<PathBuf>,
    /// Directory the local exam store reads from.
    data_dir:         PathBuf,
    /// Directory reports and caches are written to.
    out_dir:          PathBuf,
    /// Snapshot service endpoint; snapshots are disabled without one.
    snapshot_url:     Option<String>,
    /// Students graded between report checkpoints.
    checkpoint_every: usize,
    /// Shared reqwest HTTP client.
    http_client:      Client,
}

impl ConfigState {
    /// Construct a new configuration instance from the environment.
    fn new() -> Result<Self> {
        let http_client = Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .build()
            .context("Failed to construct shared HTTP client")?;

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(Self {
            timeout: read_timeout_secs("EXAMGRADE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            workers: read_count("EXAMGRADE_WORKERS", default_workers),
            python: read_non_empty("EXAMGRADE_PYTHON").map(PathBuf::from),
            data_dir: read_non_empty("EXAMGRADE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            out_dir: read_non_empty("EXAMGRADE_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            snapshot_url: read_non_empty("EXAMGRADE_SNAPSHOT_URL"),
            checkpoint_every: read_count("EXAMGRADE_CHECKPOINT_EVERY", DEFAULT_CHECKPOINT_EVERY),
            http_client,
        })
    }

    /// Returns the per-call execution deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the default worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the Python interpreter override, if any.
    pub fn python(&self) -> Option<&Path> {
        self.python.as_deref()
    }

    /// Returns the exam data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the output directory.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Returns the snapshot service endpoint, if configured.
    pub fn snapshot_url(&self) -> Option<&str> {
        self.snapshot_url.as_deref()
    }

    /// Returns how many students are graded between checkpoints.
    pub fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    /// Returns a clone of the shared reqwest HTTP client.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot.lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = Arc::new(ConfigState::new()?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    ensure_initialized().expect("configuration initialization failed")
}

/// Reads a variable, treating blank values as unset.
fn read_non_empty(env: &str) -> Option<String> {
    std::env::var(env)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Parses a positive count, falling back to `default` when it is missing,
/// malformed, or zero.
fn read_count(env: &str, default: usize) -> usize {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_use_defaults() {
        assert_eq!(
            read_timeout_secs("EXAMGRADE_TEST_UNSET_TIMEOUT", 7),
            Duration::from_secs(7)
        );
        assert_eq!(read_count("EXAMGRADE_TEST_UNSET_COUNT", 3), 3);
        assert!(read_non_empty("EXAMGRADE_TEST_UNSET_STRING").is_none());
    }
}
