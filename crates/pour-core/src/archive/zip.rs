use std::fs::File;
use std::io;
use std::path::Path;

use super::{apply_mode, create_parent, sanitize_entry_path, ExtractReport};
use crate::control::CancelToken;
use crate::error::InstallError;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub(super) fn extract_zip(
    archive_path: &Path,
    file: File,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<ExtractReport, InstallError> {
    let corrupt = |e: ::zip::result::ZipError| InstallError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut archive = ::zip::ZipArchive::new(file).map_err(corrupt)?;
    let mut report = ExtractReport::default();

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        let mut entry = archive.by_index(i).map_err(corrupt)?;
        let rel = match entry.enclosed_name().and_then(|p| sanitize_entry_path(&p)) {
            Some(p) => p,
            None => {
                return Err(InstallError::UnsafeEntry {
                    entry: entry.name().to_string(),
                })
            }
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dest.join(&rel);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| InstallError::io("create dir", &out, e))?;
            report.dirs += 1;
            continue;
        }
        if mode.map_or(false, |m| m & S_IFMT == S_IFLNK) {
            tracing::debug!(entry = entry.name(), "skipping symlink entry");
            report.skipped += 1;
            continue;
        }

        create_parent(&out)?;
        let mut outfile = File::create(&out).map_err(|e| InstallError::io("create", &out, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => InstallError::CorruptArchive {
                path: archive_path.to_path_buf(),
                reason: format!("{}: {}", entry.name(), e),
            },
            _ => InstallError::io("write", &out, e),
        })?;
        if let Some(m) = mode {
            apply_mode(&out, m)?;
        }
        report.files += 1;
    }
    Ok(report)
}
