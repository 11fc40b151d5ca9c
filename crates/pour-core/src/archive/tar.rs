use std::io::Read;
use std::path::Path;

use super::{apply_mode, create_parent, sanitize_entry_path, ExtractReport};
use crate::control::CancelToken;
use crate::error::InstallError;

pub(super) fn extract_tar<R: Read>(
    archive_path: &Path,
    reader: R,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<ExtractReport, InstallError> {
    let corrupt = |e: std::io::Error| InstallError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut archive = ::tar::Archive::new(reader);
    let mut report = ExtractReport::default();

    for entry in archive.entries().map_err(corrupt)? {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        let mut entry = entry.map_err(corrupt)?;
        let raw_path = entry.path().map_err(corrupt)?.into_owned();
        let rel = sanitize_entry_path(&raw_path).ok_or_else(|| InstallError::UnsafeEntry {
            entry: raw_path.display().to_string(),
        })?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dest.join(&rel);
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| InstallError::io("create dir", &out, e))?;
            report.dirs += 1;
        } else if kind.is_file() {
            create_parent(&out)?;
            let mut outfile =
                std::fs::File::create(&out).map_err(|e| InstallError::io("create", &out, e))?;
            std::io::copy(&mut entry, &mut outfile).map_err(corrupt)?;
            let mode = entry.header().mode().map_err(corrupt)?;
            apply_mode(&out, mode)?;
            report.files += 1;
        } else {
            tracing::debug!(entry = %raw_path.display(), "skipping non-regular tar entry");
            report.skipped += 1;
        }
    }
    Ok(report)
}
