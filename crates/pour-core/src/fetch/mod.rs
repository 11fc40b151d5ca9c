//! Fetcher: retrieve an archive URL into a scoped scratch directory.
//!
//! Each attempt is a single curl GET (see [`transfer`]); attempts are driven by
//! the retry policy and stop early when the cancel token is set. The scratch
//! directory is a `TempDir` and disappears with the [`FetchedArchive`] unless
//! the caller promotes the file into the [`DownloadCache`].

mod cache;
mod transfer;

pub use cache::DownloadCache;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::PourConfig;
use crate::control::CancelToken;
use crate::error::FetchError;
use crate::retry::{run_with_retry, AttemptError, RetryPolicy};

/// Curl and retry settings for one fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    /// Whole-transfer timeout per attempt.
    pub timeout: Duration,
    /// Abort an attempt when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
    pub retry: RetryPolicy,
    /// Parent for scratch directories; system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            scratch_root: None,
        }
    }
}

impl FetchOptions {
    pub fn from_config(cfg: &PourConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            low_speed_limit: cfg.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
            retry: cfg.retry_policy(),
            scratch_root: None,
        }
    }
}

/// Where a fetched archive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Network,
    Cache,
}

/// A local copy of the archive. Network downloads live in a scratch `TempDir`
/// owned by this value; cache hits point into the cache directory.
#[derive(Debug)]
pub struct FetchedArchive {
    path: PathBuf,
    origin: Origin,
    bytes: u64,
    _scratch: Option<tempfile::TempDir>,
}

impl FetchedArchive {
    pub(crate) fn from_cache(path: PathBuf, bytes: u64) -> Self {
        Self {
            path,
            origin: Origin::Cache,
            bytes,
            _scratch: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

pub struct Fetcher {
    options: FetchOptions,
    cancel: CancelToken,
}

impl Fetcher {
    pub fn new(options: FetchOptions, cancel: CancelToken) -> Self {
        Self { options, cancel }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Download `url` into a fresh scratch directory as `file_name`.
    pub fn fetch(&self, url: &str, file_name: &str) -> Result<FetchedArchive, FetchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pour-fetch-");
        let scratch = match &self.options.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(FetchError::Scratch)?;
        let dest = scratch.path().join(file_name);

        let mut attempts = 0u32;
        let result = run_with_retry(&self.options.retry, &self.cancel, |attempt| {
            attempts = attempt;
            tracing::debug!(url, attempt, "fetch attempt");
            transfer::download_to(url, &dest, &self.options, &self.cancel)
        });

        match result {
            Ok(bytes) => {
                tracing::info!(url, bytes, attempts, "archive downloaded");
                Ok(FetchedArchive {
                    path: dest,
                    origin: Origin::Network,
                    bytes,
                    _scratch: Some(scratch),
                })
            }
            Err(AttemptError::Cancelled) => Err(FetchError::Cancelled),
            Err(source) => Err(FetchError::Transfer {
                url: url.to_string(),
                attempts: attempts.max(1),
                source,
            }),
        }
    }
}
