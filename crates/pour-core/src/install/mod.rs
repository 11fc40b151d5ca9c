//! Installer: extract a verified archive and place the descriptor's files
//! under the prefix as one transaction.
//!
//! The caller holds the [`PrefixLock`] for the duration of install, smoke
//! test and commit. [`Installer::install`] returns an uncommitted
//! [`InstallTransaction`]; dropping it undoes the install.

mod layout;
mod lock;
mod receipt;
pub(crate) mod staging;
mod transaction;

pub use layout::Layout;
pub use lock::PrefixLock;
pub use receipt::Receipt;
pub use transaction::InstallTransaction;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::control::CancelToken;
use crate::descriptor::{Descriptor, DestinationKind};
use crate::error::InstallError;

/// One file the installer will place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Path inside the extracted archive.
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: DestinationKind,
}

pub struct Installer {
    layout: Layout,
    cancel: CancelToken,
}

impl Installer {
    pub fn new(prefix: impl Into<PathBuf>, cancel: CancelToken) -> Self {
        Self {
            layout: Layout::new(prefix),
            cancel,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Where each install step of `descriptor` would land. Touches nothing.
    pub fn plan(&self, descriptor: &Descriptor) -> Vec<PlannedFile> {
        descriptor
            .install_steps()
            .iter()
            .map(|step| PlannedFile {
                source: step.source().to_path_buf(),
                destination: self.layout.destination(step, descriptor.name()),
                kind: step.kind(),
            })
            .collect()
    }

    /// Block until the prefix lock is held (or the run is cancelled).
    pub fn lock(&self) -> Result<PrefixLock, InstallError> {
        PrefixLock::acquire(&self.layout.lock_path(), &self.cancel)
    }

    /// Extract `archive` and place every planned file. Caller must hold the lock.
    pub fn install(
        &self,
        descriptor: &Descriptor,
        archive_path: &Path,
    ) -> Result<InstallTransaction, InstallError> {
        self.check_cancel()?;
        let plan = self.plan(descriptor);

        let extracted = tempfile::Builder::new()
            .prefix("pour-extract-")
            .tempdir()
            .map_err(|e| InstallError::io("create temp dir", std::env::temp_dir(), e))?;
        archive::extract(
            archive_path,
            descriptor.archive_format(),
            extracted.path(),
            &self.cancel,
        )?;

        let sources = plan
            .iter()
            .map(|f| locate_source(extracted.path(), &f.source))
            .collect::<Result<Vec<_>, _>>()?;

        let dirs: BTreeSet<&Path> = plan
            .iter()
            .filter_map(|f| f.destination.parent())
            .collect();
        for dir in dirs {
            ensure_writable(dir)?;
        }

        let mut txn = InstallTransaction::new();
        for (file, src) in plan.iter().zip(&sources) {
            // An early return drops `txn`, which rolls back what was placed.
            self.check_cancel()?;
            let mode = destination_mode(file.kind, staging::file_mode(src)?);
            txn.place(src, &file.destination, mode)?;
        }
        tracing::info!(
            name = descriptor.name(),
            files = txn.files().len(),
            prefix = %self.layout.prefix().display(),
            "files installed"
        );
        Ok(txn)
    }

    pub fn write_receipt(&self, receipt: &Receipt) -> Result<PathBuf, InstallError> {
        let path = self.layout.receipt_path(&receipt.name);
        receipt.write(&path)?;
        Ok(path)
    }

    pub fn receipt(&self, name: &str) -> Result<Option<Receipt>, InstallError> {
        Receipt::read(&self.layout.receipt_path(name))
    }

    /// Remove every file recorded for `name`, then its receipt. Takes the lock.
    pub fn uninstall(&self, name: &str) -> Result<Receipt, InstallError> {
        let _lock = self.lock()?;
        let receipt_path = self.layout.receipt_path(name);
        let receipt = Receipt::read(&receipt_path)?.ok_or_else(|| InstallError::NotInstalled {
            name: name.to_string(),
            prefix: self.layout.prefix().to_path_buf(),
        })?;
        for file in &receipt.files {
            match std::fs::remove_file(file) {
                Ok(()) => tracing::debug!(path = %file.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %file.display(), "already gone")
                }
                Err(e) => return Err(InstallError::io("remove", file, e)),
            }
        }
        std::fs::remove_file(&receipt_path)
            .map_err(|e| InstallError::io("remove", &receipt_path, e))?;
        tracing::info!(name, version = %receipt.version, "uninstalled");
        Ok(receipt)
    }

    fn check_cancel(&self) -> Result<(), InstallError> {
        self.cancel.check().map_err(|_| InstallError::Cancelled)
    }
}

/// Mode for an installed file given the archived mode.
fn destination_mode(kind: DestinationKind, archived: u32) -> u32 {
    match kind {
        DestinationKind::Executable => (archived & 0o777) | 0o755,
        _ => (archived & 0o777) | 0o644,
    }
}

/// Resolve `source` in the extracted tree. An archive that wraps everything in
/// one top-level directory is looked into as well.
fn locate_source(root: &Path, source: &Path) -> Result<PathBuf, InstallError> {
    let direct = root.join(source);
    if direct.is_file() {
        return Ok(direct);
    }
    if let Some(top) = single_top_dir(root) {
        let nested = top.join(source);
        if nested.is_file() {
            return Ok(nested);
        }
    }
    Err(InstallError::MissingSource {
        path: source.to_path_buf(),
    })
}

fn single_top_dir(root: &Path) -> Option<PathBuf> {
    let mut entries = std::fs::read_dir(root).ok()?;
    let first = entries.next()?.ok()?;
    if entries.next().is_some() {
        return None;
    }
    let path = first.path();
    path.is_dir().then_some(path)
}

fn ensure_writable(dir: &Path) -> Result<(), InstallError> {
    let not_writable = |source| InstallError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(not_writable)?;
    tempfile::NamedTempFile::new_in(dir).map_err(not_writable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_mode_always_has_exec_bits() {
        assert_eq!(destination_mode(DestinationKind::Executable, 0o644), 0o755);
        assert_eq!(destination_mode(DestinationKind::Executable, 0o700), 0o755);
        assert_eq!(destination_mode(DestinationKind::Executable, 0o775), 0o775);
        assert_eq!(destination_mode(DestinationKind::Library, 0o600), 0o644);
        assert_eq!(destination_mode(DestinationKind::Config, 0o100640), 0o644);
    }

    #[test]
    fn locate_source_looks_into_single_top_dir() {
        let dir = tempfile::tempdir().unwrap();
        let top = dir.path().join("gpup_linux_amd64");
        std::fs::create_dir(&top).unwrap();
        std::fs::write(top.join("gpup"), b"x").unwrap();
        assert_eq!(
            locate_source(dir.path(), Path::new("gpup")).unwrap(),
            top.join("gpup")
        );
        assert_eq!(
            locate_source(dir.path(), Path::new("gpup_linux_amd64/gpup")).unwrap(),
            top.join("gpup")
        );
        assert!(matches!(
            locate_source(dir.path(), Path::new("missing")),
            Err(InstallError::MissingSource { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_destination_is_reported() {
        use std::os::unix::fs::PermissionsExt;
        // root ignores directory permissions
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let ro = dir.path().join("ro");
        std::fs::create_dir(&ro).unwrap();
        std::fs::set_permissions(&ro, std::fs::Permissions::from_mode(0o555)).unwrap();
        let err = ensure_writable(&ro.join("bin")).unwrap_err();
        std::fs::set_permissions(&ro, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, InstallError::NotWritable { .. }));
    }
}
