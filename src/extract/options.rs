//! Extraction options and configuration.

use std::env;
use std::path::PathBuf;
use std::thread;

use log::warn;

/// Environment variable overriding the worker count.
pub const PARALLELISM_ENV: &str = "UNAI_PARALLELISM";
/// Environment variable naming a file that receives the checkpoint timeline.
pub const PROFILE_ENV: &str = "UNAI_PROFILE";

/// Default growth of live bytes that triggers a reclaim: 256 MiB.
pub const DEFAULT_RECLAIM_THRESHOLD: u64 = 256 * 1024 * 1024;

/// Options for materializing a parsed document.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Worker threads in the bitmap pool
    pub parallelism: usize,

    /// Live-byte growth since the last checkpoint that triggers a reclaim
    pub reclaim_threshold: u64,

    /// Where to write the checkpoint timeline as JSON
    pub profile_path: Option<PathBuf>,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `UNAI_PARALLELISM` and `UNAI_PROFILE`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(raw) = env::var(PARALLELISM_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => options.parallelism = n,
                _ => warn!("ignoring {PARALLELISM_ENV}={raw:?}"),
            }
        }
        if let Some(path) = env::var_os(PROFILE_ENV).filter(|p| !p.is_empty()) {
            options.profile_path = Some(PathBuf::from(path));
        }
        options
    }

    /// Set the worker count (at least one).
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Set the reclaim threshold in bytes.
    pub fn with_reclaim_threshold(mut self, bytes: u64) -> Self {
        self.reclaim_threshold = bytes;
        self
    }

    /// Write the checkpoint timeline to `path`.
    pub fn with_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
            profile_path: None,
        }
    }
}

/// Available hardware parallelism, one when unknown.
pub fn default_parallelism() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
