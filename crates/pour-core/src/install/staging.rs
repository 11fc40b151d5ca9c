//! Staged file writes: copy to `<dest>.part`, fsync, rename over `<dest>`.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::InstallError;

/// Temporary file suffix used before atomic rename.
pub(crate) const PART_SUFFIX: &str = ".part";
/// Suffix of the backup kept for a replaced file until commit.
pub(crate) const PREV_SUFFIX: &str = ".prev";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(suffix);
    PathBuf::from(o)
}

/// `file` -> `file.part`.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    with_suffix(dest, PART_SUFFIX)
}

/// `file` -> `file.prev`.
pub(crate) fn prev_path(dest: &Path) -> PathBuf {
    with_suffix(dest, PREV_SUFFIX)
}

/// Copy `src` to `dest` with permission bits `mode`. `dest` never holds a partial file.
pub(crate) fn stage_copy(src: &Path, dest: &Path, mode: u32) -> Result<(), InstallError> {
    let part = part_path(dest);
    let result = write_part(src, &part, mode).and_then(|()| {
        std::fs::rename(&part, dest).map_err(|e| InstallError::io("rename", dest, e))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

/// Write `bytes` to `dest` through a `.part` file.
pub(crate) fn stage_bytes(bytes: &[u8], dest: &Path) -> Result<(), InstallError> {
    use std::io::Write;
    let part = part_path(dest);
    let result = File::create(&part)
        .and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        })
        .map_err(|e| InstallError::io("write", &part, e))
        .and_then(|()| std::fs::rename(&part, dest).map_err(|e| InstallError::io("rename", dest, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn write_part(src: &Path, part: &Path, mode: u32) -> Result<(), InstallError> {
    let mut input = File::open(src).map_err(|e| InstallError::io("open", src, e))?;
    let mut out = File::create(part).map_err(|e| InstallError::io("create", part, e))?;
    io::copy(&mut input, &mut out).map_err(|e| InstallError::io("copy", part, e))?;
    set_mode(&out, part, mode)?;
    out.sync_all()
        .map_err(|e| InstallError::io("sync", part, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &File, path: &Path, mode: u32) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
        .map_err(|e| InstallError::io("chmod", path, e))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _path: &Path, _mode: u32) -> Result<(), InstallError> {
    Ok(())
}

/// Permission bits of `path`.
#[cfg(unix)]
pub(crate) fn file_mode(path: &Path) -> Result<u32, InstallError> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path).map_err(|e| InstallError::io("stat", path, e))?;
    Ok(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub(crate) fn file_mode(_path: &Path) -> Result<u32, InstallError> {
    Ok(0o644)
}
