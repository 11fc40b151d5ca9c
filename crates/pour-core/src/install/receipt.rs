//! Install receipts: `<prefix>/.pour/receipts/<name>.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::staging::stage_bytes;
use crate::checksum::Sha256Digest;
use crate::descriptor::Descriptor;
use crate::error::InstallError;

/// What a successful run installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: Sha256Digest,
    pub files: Vec<PathBuf>,
    /// Seconds since the Unix epoch.
    pub installed_at: u64,
}

impl Receipt {
    pub fn new(descriptor: &Descriptor, files: Vec<PathBuf>) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: descriptor.name().to_string(),
            version: descriptor.version().to_string(),
            url: descriptor.url().to_string(),
            sha256: *descriptor.expected_checksum(),
            files,
            installed_at,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), InstallError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| InstallError::io("create dir", dir, e))?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|e| InstallError::Receipt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        stage_bytes(&json, path)
    }

    /// `Ok(None)` when no receipt exists at `path`.
    pub fn read(path: &Path) -> Result<Option<Self>, InstallError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InstallError::io("read", path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| InstallError::Receipt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}
