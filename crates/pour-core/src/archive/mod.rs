//! Archive detection and extraction into a scoped directory.
//!
//! Entry paths are sanitized before anything is written: absolute paths and
//! `..` components are rejected. Unix mode bits stored in the archive are
//! applied to extracted files. Symlinks and other special entries are skipped.

mod tar;
mod zip;

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::control::CancelToken;
use crate::error::InstallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Format from the archive's file name (case-insensitive suffix match).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Checks the leading bytes of `path` against this format's magic number.
    pub fn matches_magic(&self, path: &Path) -> std::io::Result<bool> {
        let mut head = [0u8; 512];
        let mut f = File::open(path)?;
        let mut n = 0;
        while n < head.len() {
            let r = f.read(&mut head[n..])?;
            if r == 0 {
                break;
            }
            n += r;
        }
        let head = &head[..n];
        Ok(match self {
            ArchiveFormat::Zip => head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06"),
            ArchiveFormat::TarGz => head.starts_with(&[0x1f, 0x8b]),
            ArchiveFormat::Tar => head.len() >= 262 && &head[257..262] == b"ustar",
        })
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Tar => "tar",
        };
        f.write_str(s)
    }
}

/// What an extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
}

/// Extract `archive` (of `format`) into `dest`, which must already exist.
pub fn extract(
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<ExtractReport, InstallError> {
    let magic_ok = format
        .matches_magic(archive)
        .map_err(|e| InstallError::io("read", archive, e))?;
    if !magic_ok {
        return Err(InstallError::CorruptArchive {
            path: archive.to_path_buf(),
            reason: format!("content is not a {} archive", format),
        });
    }
    let file = File::open(archive).map_err(|e| InstallError::io("open", archive, e))?;
    let report = match format {
        ArchiveFormat::Zip => zip::extract_zip(archive, file, dest, cancel)?,
        ArchiveFormat::TarGz => {
            tar::extract_tar(archive, flate2::read::GzDecoder::new(file), dest, cancel)?
        }
        ArchiveFormat::Tar => tar::extract_tar(archive, file, dest, cancel)?,
    };
    tracing::debug!(
        archive = %archive.display(),
        files = report.files,
        dirs = report.dirs,
        skipped = report.skipped,
        "archive extracted"
    );
    Ok(report)
}

/// Relative form of an entry name, or `None` if it is absolute or climbs out with `..`.
pub(crate) fn sanitize_entry_path(name: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in name.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn create_parent(path: &Path) -> Result<(), InstallError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| InstallError::io("create dir", parent, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
        .map_err(|e| InstallError::io("chmod", path, e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<(), InstallError> {
    Ok(())
}
