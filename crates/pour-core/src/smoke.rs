//! Smoke tester: run the descriptor's test command against the fresh install.
//!
//! `<prefix>/bin` is prepended to `PATH`, and the program is taken from there
//! when it names an installed file. Output is drained on helper threads so a
//! chatty command cannot block on a full pipe. The child is killed on timeout
//! or cancellation.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::error::TestError;

const POLL: Duration = Duration::from_millis(20);

/// Result of a passing smoke test.
#[derive(Debug, Clone)]
pub struct SmokeOutcome {
    pub program: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

pub struct SmokeTester {
    bin_dir: PathBuf,
    timeout: Duration,
    cancel: CancelToken,
}

impl SmokeTester {
    pub fn new(bin_dir: impl Into<PathBuf>, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            timeout,
            cancel,
        }
    }

    /// The program that `command[0]` resolves to.
    pub fn resolve_program(&self, program: &str) -> PathBuf {
        let as_path = Path::new(program);
        if as_path.components().count() == 1 {
            let installed = self.bin_dir.join(as_path);
            if installed.is_file() {
                return installed;
            }
        }
        as_path.to_path_buf()
    }

    pub fn run(&self, command: &[String]) -> Result<SmokeOutcome, TestError> {
        let (first, args) = match command.split_first() {
            Some((first, args)) if !first.is_empty() => (first, args),
            _ => return Err(TestError::EmptyCommand),
        };
        self.cancel.check().map_err(|_| TestError::Cancelled)?;

        let program = self.resolve_program(first);
        let shown = command.join(" ");
        tracing::info!(command = %shown, program = %program.display(), "running smoke test");

        let started = Instant::now();
        let mut child = Command::new(&program)
            .args(args)
            .env("PATH", self.search_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TestError::Spawn {
                program: first.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Stream::Stdout, tx.clone());
        drain(child.stderr.take(), Stream::Stderr, tx);

        // Reader threads that are still running past this point are detached.
        let status = self.wait(&mut child, started, &shown)?;
        let (stdout, stderr) = self.collect_output(&rx, started)?;
        let elapsed = started.elapsed();

        if !status.success() {
            return Err(TestError::Failed {
                command: shown,
                status: status.to_string(),
                stderr,
            });
        }
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "smoke test passed");
        Ok(SmokeOutcome {
            program,
            stdout,
            stderr,
            elapsed,
        })
    }

    fn wait(&self, child: &mut Child, started: Instant, shown: &str) -> Result<ExitStatus, TestError> {
        loop {
            if let Some(status) = child.try_wait().map_err(TestError::Wait)? {
                return Ok(status);
            }
            if self.cancel.is_cancelled() {
                kill(child);
                return Err(TestError::Cancelled);
            }
            if started.elapsed() >= self.timeout {
                kill(child);
                return Err(TestError::Timeout {
                    command: shown.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL);
        }
    }

    /// Gathers drained output until both pipes close. A background process
    /// that inherited the pipes can hold them open past the child's exit, so
    /// the wait is bounded by the remaining timeout and by cancellation.
    fn collect_output(
        &self,
        rx: &mpsc::Receiver<(Stream, Vec<u8>)>,
        started: Instant,
    ) -> Result<(String, String), TestError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            match rx.recv_timeout(POLL) {
                Ok((Stream::Stdout, buf)) => stdout = buf,
                Ok((Stream::Stderr, buf)) => stderr = buf,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        return Err(TestError::Cancelled);
                    }
                    if started.elapsed() >= self.timeout {
                        tracing::warn!("smoke test output still open after exit, not waiting further");
                        break;
                    }
                }
            }
        }
        Ok((lossy(stdout), lossy(stderr)))
    }

    fn search_path(&self) -> OsString {
        let mut dirs = vec![self.bin_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(dirs).unwrap_or_else(|_| self.bin_dir.clone().into_os_string())
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    if let Some(mut r) = pipe {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            let _ = tx.send((stream, buf));
        });
    }
}

fn lossy(buf: Vec<u8>) -> String {
    String::from_utf8_lossy(&buf).into_owned()
}
