//! Error taxonomy for a pour run.
//!
//! Each stage has its own error type; [`RunError`] wraps them and knows the
//! stage that failed and the process exit code it maps to.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::Sha256Digest;
use crate::descriptor::template::TemplateError;
use crate::retry::AttemptError;

/// Exit code for an invalid or unresolvable descriptor (or a bad config file).
pub const EXIT_DESCRIPTOR: i32 = 5;
/// Exit code when the run was interrupted.
pub const EXIT_CANCELLED: i32 = 130;

/// Pipeline stage, used to report where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Verify,
    Install,
    Test,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Install => "install",
            Stage::Test => "test",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
    #[error("field `{field}`: {source}")]
    Template {
        field: String,
        #[source]
        source: TemplateError,
    },
}

impl DescriptorError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DescriptorError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed after {attempts} attempt(s): {source}")]
    Transfer {
        url: String,
        attempts: u32,
        #[source]
        source: AttemptError,
    },
    #[error("create scratch directory: {0}")]
    Scratch(#[source] io::Error),
    #[error("download cache {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        path: PathBuf,
        expected: Sha256Digest,
        actual: Sha256Digest,
    },
    #[error("hash {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),
    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },
    #[error("archive entry `{entry}` escapes the extraction root")]
    UnsafeEntry { entry: String },
    #[error("`{}` not found in the extracted archive", .path.display())]
    MissingSource { path: PathBuf },
    #[error("destination {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{name} is not installed in {prefix}")]
    NotInstalled { name: String, prefix: PathBuf },
    #[error("receipt {path}: {reason}")]
    Receipt { path: PathBuf, reason: String },
    #[error("cancelled")]
    Cancelled,
}

impl InstallError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        InstallError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum TestError {
    #[error("test command is empty")]
    EmptyCommand,
    #[error("spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}{}", stderr_tail(.stderr))]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("`{command}` did not finish within {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("wait for test command: {0}")]
    Wait(#[source] io::Error),
    #[error("cancelled")]
    Cancelled,
}

fn stderr_tail(stderr: &str) -> String {
    const MAX: usize = 512;
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let start = trimmed
        .char_indices()
        .rev()
        .nth(MAX.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("; stderr: {}", &trimmed[start..])
}

/// Failure of a whole run: the stage that failed plus its typed cause.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fetch failed: {0}")]
    Network(#[from] FetchError),
    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("install failed: {0}")]
    Install(#[from] InstallError),
    #[error("smoke test failed: {0}")]
    Test(#[from] TestError),
    #[error("cancelled during {0} stage")]
    Cancelled(Stage),
}

impl RunError {
    pub fn stage(&self) -> Stage {
        match self {
            RunError::Network(_) => Stage::Fetch,
            RunError::Integrity(_) => Stage::Verify,
            RunError::Install(_) => Stage::Install,
            RunError::Test(_) => Stage::Test,
            RunError::Cancelled(stage) => *stage,
        }
    }

    /// Process exit code: 1 fetch, 2 integrity, 3 install, 4 smoke test, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Network(_) => 1,
            RunError::Integrity(_) => 2,
            RunError::Install(_) => 3,
            RunError::Test(_) => 4,
            RunError::Cancelled(_) => EXIT_CANCELLED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_stage() {
        let net = RunError::from(FetchError::Cancelled);
        assert_eq!(net.exit_code(), 1);
        assert_eq!(net.stage(), Stage::Fetch);

        let integrity = RunError::from(IntegrityError::Mismatch {
            path: PathBuf::from("a.zip"),
            expected: Sha256Digest::of_bytes(b"a"),
            actual: Sha256Digest::of_bytes(b"b"),
        });
        assert_eq!(integrity.exit_code(), 2);
        assert_eq!(integrity.stage(), Stage::Verify);

        let install = RunError::from(InstallError::MissingSource {
            path: PathBuf::from("gpup"),
        });
        assert_eq!(install.exit_code(), 3);

        let test = RunError::from(TestError::EmptyCommand);
        assert_eq!(test.exit_code(), 4);
        assert_eq!(test.stage(), Stage::Test);

        let cancelled = RunError::Cancelled(Stage::Install);
        assert_eq!(cancelled.exit_code(), EXIT_CANCELLED);
        assert_eq!(cancelled.stage(), Stage::Install);
    }

    #[test]
    fn failed_test_includes_stderr_tail() {
        let e = TestError::Failed {
            command: "gpup --help".into(),
            status: "exit status: 2".into(),
            stderr: "  unknown flag\n".into(),
        };
        assert_eq!(
            e.to_string(),
            "`gpup --help` exited with exit status: 2; stderr: unknown flag"
        );

        let quiet = TestError::Failed {
            command: "gpup".into(),
            status: "exit status: 1".into(),
            stderr: String::new(),
        };
        assert_eq!(quiet.to_string(), "`gpup` exited with exit status: 1");
    }

    #[test]
    fn stderr_tail_keeps_last_bytes() {
        let long = "x".repeat(2000) + "END";
        let tail = stderr_tail(&long);
        assert!(tail.ends_with("END"));
        assert!(tail.len() <= "; stderr: ".len() + 512);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Fetch.to_string(), "fetch");
        assert_eq!(Stage::Verify.to_string(), "verify");
        assert_eq!(Stage::Install.to_string(), "install");
        assert_eq!(Stage::Test.to_string(), "test");
    }
}
