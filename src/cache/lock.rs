//! Exclusive lock guarding a cache root
//!
//! The lock file sits next to the root (`<root>.lock`) so the sweep never
//! sees it. The lock is advisory and released when the guard drops.

use crate::error::{ImgsyncError, ImgsyncResult};
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held lock on a cache root
#[derive(Debug)]
pub struct CacheLock {
    _file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Path of the lock file for `root`
    pub fn path_for(root: &Path) -> PathBuf {
        let mut name = root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache".into());
        name.push(".lock");
        root.with_file_name(name)
    }

    /// Take the lock without waiting; fails with `CacheLocked` if held
    pub fn acquire(root: &Path) -> ImgsyncResult<Self> {
        let path = Self::path_for(root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ImgsyncError::io(format!("creating {}", parent.display()), e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ImgsyncError::io(format!("opening lock {}", path.display()), e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(ImgsyncError::CacheLocked(root.to_path_buf()))
            }
            Err(e) => return Err(ImgsyncError::io(format!("locking {}", path.display()), e)),
        }

        debug!("Acquired cache lock {}", path.display());
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_file_is_sibling_of_root() {
        assert_eq!(
            CacheLock::path_for(Path::new("/var/cache/imgsync/lists")),
            PathBuf::from("/var/cache/imgsync/lists.lock")
        );
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");

        let held = CacheLock::acquire(&root).unwrap();
        assert!(held.path().exists());

        let err = CacheLock::acquire(&root).unwrap_err();
        assert!(matches!(err, ImgsyncError::CacheLocked(ref p) if p == &root));

        drop(held);
        assert!(CacheLock::acquire(&root).is_ok());
    }
}
