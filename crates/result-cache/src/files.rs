//! Cache file paths and flock gating.
//!
//! The per-source `source/<key>` file is the lock point for every file the
//! source owns. Shared locks gate reads, exclusive locks gate writes, held
//! across the entire read or write of all related files. The lock applies to
//! the one open handle, so no separate lock-file descriptor is needed.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use study_common::SourceKey;

use crate::error::{CacheError, CacheResult};

/// Path of the `source/<key>` file.
pub fn source_path(study_dir: &Path, key: SourceKey) -> PathBuf {
    study_dir.join("source").join(key.to_string())
}

/// Path of the `desired_cell/<key>` file.
pub fn desired_path(study_dir: &Path, key: SourceKey) -> PathBuf {
    study_dir.join("desired_cell").join(key.to_string())
}

/// Path of an `undesired_cell` file. A global-grid cache is shared per
/// undesired source; a local-grid cache is split per desired source.
pub fn undesired_path(
    study_dir: &Path,
    key: SourceKey,
    desired_key: Option<SourceKey>,
) -> PathBuf {
    let name = match desired_key {
        Some(des) => format!("{key}_{des}"),
        None => key.to_string(),
    };
    study_dir.join("undesired_cell").join(name)
}

/// A held flock on a source's lock point. Dropping releases the lock.
pub struct SourceLock {
    file: File,
    path: PathBuf,
}

impl SourceLock {
    /// The locked `source/<key>` handle, for reading or rewriting the
    /// source record itself.
    pub fn file(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Take a shared (read) lock on a source's files. Fails with `Ok(None)`
/// when the source file does not exist (no cache yet).
pub fn lock_shared(study_dir: &Path, key: SourceKey) -> CacheResult<Option<SourceLock>> {
    let path = source_path(study_dir, key);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(&path, e)),
    };
    FileExt::lock_shared(&file).map_err(|e| CacheError::io(&path, e))?;
    Ok(Some(SourceLock { file, path }))
}

/// Take an exclusive (write) lock on a source's files, creating the lock
/// point if needed.
pub fn lock_exclusive(study_dir: &Path, key: SourceKey) -> CacheResult<SourceLock> {
    let path = source_path(study_dir, key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| CacheError::io(&path, e))?;
    FileExt::lock_exclusive(&file).map_err(|e| CacheError::io(&path, e))?;
    Ok(SourceLock { file, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let dir = Path::new("/study");
        assert_eq!(source_path(dir, 7), Path::new("/study/source/7"));
        assert_eq!(desired_path(dir, 7), Path::new("/study/desired_cell/7"));
        assert_eq!(
            undesired_path(dir, 7, None),
            Path::new("/study/undesired_cell/7")
        );
        assert_eq!(
            undesired_path(dir, 7, Some(9)),
            Path::new("/study/undesired_cell/7_9")
        );
    }

    #[test]
    fn test_shared_lock_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(lock_shared(dir.path(), 3).unwrap().is_none());
    }

    #[test]
    fn test_exclusive_then_shared() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _w = lock_exclusive(dir.path(), 3).unwrap();
        }
        // After the writer releases, a reader finds the lock point.
        let r = lock_shared(dir.path(), 3).unwrap();
        assert!(r.is_some());
    }
}
