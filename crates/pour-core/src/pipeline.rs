//! Run state machine: fetch, verify, install, smoke test.
//!
//! `Pending -> Fetched -> Verified -> Installed -> Tested -> Done`, with any
//! stage failure moving to the terminal `Failed`. Stages never retry each
//! other; only the fetcher retries its own attempts.
//!
//! The prefix lock is held from install until the receipt is written and the
//! transaction committed. A failing smoke test rolls the transaction back.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveFormat;
use crate::checksum::{self, Sha256Digest};
use crate::config::PourConfig;
use crate::control::CancelToken;
use crate::descriptor::Descriptor;
use crate::error::{FetchError, InstallError, IntegrityError, RunError, Stage, TestError};
use crate::fetch::{DownloadCache, FetchOptions, FetchedArchive, Fetcher, Origin};
use crate::install::{Installer, PlannedFile, Receipt};
use crate::smoke::SmokeTester;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Fetched,
    Verified,
    Installed,
    Tested,
    Done,
    Failed { stage: Stage, reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }

    /// Only the next state in sequence, or `Failed` from a non-terminal state.
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Fetched)
                | (Fetched, Verified)
                | (Verified, Installed)
                | (Installed, Tested)
                | (Tested, Done)
        ) || (!self.is_terminal() && matches!(next, Failed { .. }))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => f.write_str("pending"),
            RunState::Fetched => f.write_str("fetched"),
            RunState::Verified => f.write_str("verified"),
            RunState::Installed => f.write_str("installed"),
            RunState::Tested => f.write_str("tested"),
            RunState::Done => f.write_str("done"),
            RunState::Failed { stage, reason } => write!(f, "failed ({}): {}", stage, reason),
        }
    }
}

/// Knobs for one run. CLI flags are applied on top of [`RunOptions::from_config`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub prefix: PathBuf,
    pub skip_verify: bool,
    pub dry_run: bool,
    pub fetch: FetchOptions,
    /// Consulted before the network; written only when `keep_downloads` is set.
    pub cache: Option<DownloadCache>,
    pub keep_downloads: bool,
    pub test_timeout: Duration,
}

impl RunOptions {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            skip_verify: false,
            dry_run: false,
            fetch: FetchOptions::default(),
            cache: None,
            keep_downloads: false,
            test_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(cfg: &PourConfig) -> anyhow::Result<Self> {
        Ok(Self {
            prefix: cfg.resolve_prefix()?,
            skip_verify: false,
            dry_run: false,
            fetch: FetchOptions::from_config(cfg),
            cache: Some(DownloadCache::new(cfg.resolve_cache_dir()?)),
            keep_downloads: cfg.keep_downloads,
            test_timeout: Duration::from_secs(cfg.test_timeout_secs),
        })
    }
}

/// Everything a run will do, resolved without side effects.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub version: String,
    pub url: String,
    pub archive_format: ArchiveFormat,
    pub expected_checksum: Sha256Digest,
    pub prefix: PathBuf,
    pub files: Vec<PlannedFile>,
    pub test_command: Vec<String>,
}

impl Plan {
    pub fn new(descriptor: &Descriptor, installer: &Installer) -> Self {
        Self {
            name: descriptor.name().to_string(),
            version: descriptor.version().to_string(),
            url: descriptor.url().to_string(),
            archive_format: descriptor.archive_format(),
            expected_checksum: *descriptor.expected_checksum(),
            prefix: installer.layout().prefix().to_path_buf(),
            files: installer.plan(descriptor),
            test_command: descriptor.test_command().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub plan: Plan,
    pub origin: Option<Origin>,
    /// Digest of the archive as fetched.
    pub actual_checksum: Option<Sha256Digest>,
    /// False only under `skip_verify`.
    pub verified: bool,
    pub installed: Vec<PathBuf>,
    pub receipt: Option<PathBuf>,
}

pub struct Pipeline<'a> {
    descriptor: &'a Descriptor,
    options: RunOptions,
    cancel: CancelToken,
    installer: Installer,
    state: RunState,
    history: Vec<RunState>,
}

impl<'a> Pipeline<'a> {
    pub fn new(descriptor: &'a Descriptor, options: RunOptions, cancel: CancelToken) -> Self {
        let installer = Installer::new(options.prefix.clone(), cancel.clone());
        Self {
            descriptor,
            options,
            cancel,
            installer,
            state: RunState::Pending,
            history: vec![RunState::Pending],
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state visited, starting with `Pending`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn plan(&self) -> Plan {
        Plan::new(self.descriptor, &self.installer)
    }

    pub fn run(&mut self) -> Result<RunReport, RunError> {
        let plan = self.plan();
        let mut report = RunReport {
            state: RunState::Pending,
            plan,
            origin: None,
            actual_checksum: None,
            verified: false,
            installed: Vec::new(),
            receipt: None,
        };
        if self.options.dry_run {
            tracing::info!(name = self.descriptor.name(), "dry run: plan resolved, nothing fetched");
            return Ok(report);
        }
        tracing::info!(
            name = self.descriptor.name(),
            version = self.descriptor.version(),
            prefix = %self.options.prefix.display(),
            "run started"
        );

        let fetched = self.fetch().map_err(|e| self.fail(e))?;
        report.origin = Some(fetched.origin());
        self.transition(RunState::Fetched);

        let (digest, verified) = self.verify(&fetched).map_err(|e| self.fail(e))?;
        report.actual_checksum = Some(digest);
        report.verified = verified;
        self.transition(RunState::Verified);
        if verified {
            self.keep_download(&fetched);
        }

        let lock = self
            .installer
            .lock()
            .map_err(|e| self.fail(install_error(e)))?;
        let txn = self
            .installer
            .install(self.descriptor, fetched.path())
            .map_err(|e| self.fail(install_error(e)))?;
        drop(fetched);
        self.transition(RunState::Installed);

        let tester = SmokeTester::new(
            self.installer.layout().bin_dir(),
            self.options.test_timeout,
            self.cancel.clone(),
        );
        if let Err(e) = tester.run(self.descriptor.test_command()) {
            txn.rollback();
            return Err(self.fail(test_error(e)));
        }
        self.transition(RunState::Tested);

        let files = txn.files();
        let receipt = Receipt::new(self.descriptor, files.clone());
        // Dropping `txn` on error rolls the install back.
        let receipt_path = self
            .installer
            .write_receipt(&receipt)
            .map_err(|e| self.fail(install_error(e)))?;
        txn.commit();
        drop(lock);
        self.transition(RunState::Done);

        tracing::info!(name = self.descriptor.name(), files = files.len(), "run complete");
        report.state = self.state.clone();
        report.installed = files;
        report.receipt = Some(receipt_path);
        Ok(report)
    }

    fn fetch(&self) -> Result<FetchedArchive, RunError> {
        let d = self.descriptor;
        if let Some(cache) = &self.options.cache {
            if let Some(hit) = cache.lookup(d.name(), d.version(), d.archive_name()) {
                tracing::info!(path = %hit.path().display(), "using cached archive");
                return Ok(hit);
            }
        }
        let fetcher = Fetcher::new(self.options.fetch.clone(), self.cancel.clone());
        fetcher.fetch(d.url(), d.archive_name()).map_err(|e| match e {
            FetchError::Cancelled => RunError::Cancelled(Stage::Fetch),
            e => RunError::Network(e),
        })
    }

    fn verify(&self, fetched: &FetchedArchive) -> Result<(Sha256Digest, bool), RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled(Stage::Verify));
        }
        let expected = self.descriptor.expected_checksum();
        if self.options.skip_verify {
            let actual = checksum::sha256_path(fetched.path()).map_err(|source| {
                IntegrityError::Read {
                    path: fetched.path().to_path_buf(),
                    source,
                }
            })?;
            let matches = actual == *expected;
            tracing::warn!(
                expected = %expected,
                actual = %actual,
                matches,
                "checksum verification skipped"
            );
            return Ok((actual, false));
        }
        match checksum::verify_file(fetched.path(), expected) {
            Ok(actual) => Ok((actual, true)),
            Err(e) => {
                if let (Origin::Cache, Some(cache)) = (fetched.origin(), &self.options.cache) {
                    cache.evict(fetched.path());
                }
                Err(e.into())
            }
        }
    }

    fn keep_download(&self, fetched: &FetchedArchive) {
        if !self.options.keep_downloads || fetched.origin() != Origin::Network {
            return;
        }
        let Some(cache) = &self.options.cache else {
            return;
        };
        let d = self.descriptor;
        if let Err(e) = cache.store(fetched, d.name(), d.version(), d.archive_name()) {
            tracing::warn!("could not keep download: {}", e);
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(from = %self.state, to = %next, "state transition");
        self.history.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, err: RunError) -> RunError {
        let next = RunState::Failed {
            stage: err.stage(),
            reason: err.to_string(),
        };
        tracing::error!(stage = %err.stage(), "run failed: {}", err);
        self.transition(next);
        err
    }
}

fn install_error(e: InstallError) -> RunError {
    match e {
        InstallError::Cancelled => RunError::Cancelled(Stage::Install),
        e => RunError::Install(e),
    }
}

fn test_error(e: TestError) -> RunError {
    match e {
        TestError::Cancelled => RunError::Cancelled(Stage::Test),
        e => RunError::Test(e),
    }
}
