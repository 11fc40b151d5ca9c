//! Advisory exclusive lock on `<prefix>/.pour/lock`.
//!
//! Held from install through smoke test and commit so that runs targeting the
//! same prefix serialize. Released when the guard drops.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::CancelToken;
use crate::error::InstallError;

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct PrefixLock {
    file: File,
    path: PathBuf,
}

impl PrefixLock {
    /// Block until the lock is ours or `cancel` is set.
    pub fn acquire(path: &Path, cancel: &CancelToken) -> Result<Self, InstallError> {
        let file = open_lock_file(path)?;
        let mut waiting = false;
        loop {
            match try_lock(&file) {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), "prefix lock acquired");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Ok(false) => {
                    if !waiting {
                        tracing::info!(path = %path.display(), "waiting for another install to finish");
                        waiting = true;
                    }
                    cancel.sleep(POLL).map_err(|_| InstallError::Cancelled)?;
                }
                Err(source) => {
                    return Err(InstallError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }

    /// Take the lock if it is free; `None` when another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, InstallError> {
        let file = open_lock_file(path)?;
        match try_lock(&file) {
            Ok(true) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Ok(false) => Ok(None),
            Err(source) => Err(InstallError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        unlock(&self.file);
        tracing::debug!(path = %self.path.display(), "prefix lock released");
    }
}

fn open_lock_file(path: &Path) -> Result<File, InstallError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| InstallError::NotWritable {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| InstallError::Lock {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let r = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if r == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

// No advisory locking off unix; installs are not serialized there.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
