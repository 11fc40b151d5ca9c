//! Persistent download cache keyed by name, version and archive file name.

use std::path::{Path, PathBuf};

use super::FetchedArchive;
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<name>--<version>--<file_name>`.
    pub fn entry_path(&self, name: &str, version: &str, file_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}--{}--{}", name, version, file_name))
    }

    /// A cached archive for this key, if one exists.
    pub fn lookup(&self, name: &str, version: &str, file_name: &str) -> Option<FetchedArchive> {
        let path = self.entry_path(name, version, file_name);
        let meta = std::fs::metadata(&path).ok()?;
        if !meta.is_file() {
            return None;
        }
        tracing::debug!(path = %path.display(), "download cache hit");
        Some(FetchedArchive::from_cache(path, meta.len()))
    }

    /// Copy a verified archive into the cache. The entry appears atomically.
    pub fn store(
        &self,
        archive: &FetchedArchive,
        name: &str,
        version: &str,
        file_name: &str,
    ) -> Result<PathBuf, FetchError> {
        let cache_err = |path: &Path, source| FetchError::Cache {
            path: path.to_path_buf(),
            source,
        };
        let dest = self.entry_path(name, version, file_name);
        if archive.path() == dest {
            return Ok(dest);
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| cache_err(&self.dir, e))?;
        // Each store stages through its own temp file, so concurrent runs
        // for the same key never share a partial copy.
        let mut staged =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| cache_err(&self.dir, e))?;
        let mut src = std::fs::File::open(archive.path()).map_err(|e| cache_err(archive.path(), e))?;
        std::io::copy(&mut src, staged.as_file_mut()).map_err(|e| cache_err(staged.path(), e))?;
        staged.as_file().sync_all().map_err(|e| cache_err(staged.path(), e))?;
        staged.persist(&dest).map_err(|e| cache_err(&dest, e.error))?;
        tracing::info!(path = %dest.display(), "archive kept in download cache");
        Ok(dest)
    }

    /// Remove a cache entry (used when it fails verification).
    pub fn evict(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::warn!(path = %path.display(), "removed corrupt cache entry"),
            Err(e) => tracing::warn!(path = %path.display(), "could not remove cache entry: {}", e),
        }
    }
}
