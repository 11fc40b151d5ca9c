//! Install transaction: placed files can be rolled back until commit.
//!
//! Replacing an existing file first moves it to `<dest>.prev`. Commit deletes
//! the backups; rollback removes what was placed and puts the backups back.
//! A transaction dropped without commit rolls back.

use std::path::{Path, PathBuf};

use super::staging::{prev_path, stage_copy};
use crate::error::InstallError;

#[derive(Debug)]
struct Placed {
    dest: PathBuf,
    backup: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct InstallTransaction {
    placed: Vec<Placed>,
}

impl InstallTransaction {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Copy `src` over `dest` with `mode`, keeping any previous `dest` as a backup.
    pub(crate) fn place(&mut self, src: &Path, dest: &Path, mode: u32) -> Result<(), InstallError> {
        let backup = match std::fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(InstallError::io(
                    "replace",
                    dest,
                    std::io::Error::new(std::io::ErrorKind::Other, "destination is a directory"),
                ))
            }
            Ok(_) => {
                let prev = prev_path(dest);
                // Left over from an interrupted run.
                if prev.exists() {
                    std::fs::remove_file(&prev).map_err(|e| InstallError::io("remove", &prev, e))?;
                }
                std::fs::rename(dest, &prev).map_err(|e| InstallError::io("back up", dest, e))?;
                Some(prev)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(InstallError::io("stat", dest, e)),
        };
        self.placed.push(Placed {
            dest: dest.to_path_buf(),
            backup,
        });
        stage_copy(src, dest, mode)?;
        tracing::debug!(dest = %dest.display(), mode = %format!("{:o}", mode), "file placed");
        Ok(())
    }

    /// Destinations placed so far, in order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.placed.iter().map(|p| p.dest.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Keep the placed files and delete the backups.
    pub fn commit(mut self) {
        for p in std::mem::take(&mut self.placed) {
            if let Some(backup) = p.backup {
                if let Err(e) = std::fs::remove_file(&backup) {
                    tracing::warn!(path = %backup.display(), "could not remove backup: {}", e);
                }
            }
        }
        tracing::debug!("install transaction committed");
    }

    /// Remove the placed files and restore what they replaced.
    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        let placed = std::mem::take(&mut self.placed);
        if placed.is_empty() {
            return;
        }
        tracing::warn!(files = placed.len(), "rolling back install");
        for p in placed.into_iter().rev() {
            match std::fs::remove_file(&p.dest) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %p.dest.display(), "rollback: remove failed: {}", e),
            }
            if let Some(backup) = p.backup {
                if let Err(e) = std::fs::rename(&backup, &p.dest) {
                    tracing::warn!(path = %p.dest.display(), "rollback: restore failed: {}", e);
                }
            }
        }
    }
}

impl Drop for InstallTransaction {
    fn drop(&mut self) {
        self.undo();
    }
}
