//! Directory layout under an installation prefix.

use std::path::{Path, PathBuf};

use crate::descriptor::{DestinationKind, InstallStep};

const STATE_DIR: &str = ".pour";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    prefix: PathBuf,
}

impl Layout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// Directory that receives files of `kind` for package `name`.
    pub fn dir_for(&self, kind: DestinationKind, name: &str) -> PathBuf {
        match kind {
            DestinationKind::Executable => self.bin_dir(),
            DestinationKind::Library => self.prefix.join("lib"),
            DestinationKind::Include => self.prefix.join("include"),
            DestinationKind::Share => self.prefix.join("share").join(name),
            DestinationKind::Config => self.prefix.join("etc"),
        }
    }

    pub fn destination(&self, step: &InstallStep, name: &str) -> PathBuf {
        self.dir_for(step.kind(), name).join(step.file_name())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join(STATE_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("lock")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.state_dir().join("receipts")
    }

    pub fn receipt_path(&self, name: &str) -> PathBuf {
        self.receipts_dir().join(format!("{}.json", name))
    }
}
