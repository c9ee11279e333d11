use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::WorkspaceError;

const LOCK_FILE_NAME: &str = ".medic.lock";

/// Exclusive advisory lock on a workspace root, released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Take the lock without waiting; fails with `Locked` when another
    /// process holds it.
    pub fn acquire(root: &Path) -> Result<Self, WorkspaceError> {
        std::fs::create_dir_all(root).map_err(|source| WorkspaceError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let path = root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| WorkspaceError::Io {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| WorkspaceError::Locked(root.to_path_buf()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let first = WorkspaceLock::acquire(dir.path()).unwrap();
        assert!(first.path().ends_with(LOCK_FILE_NAME));

        let second = WorkspaceLock::acquire(dir.path());
        assert!(matches!(second, Err(WorkspaceError::Locked(_))));

        drop(first);
        assert!(WorkspaceLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_acquire_creates_missing_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let _lock = WorkspaceLock::acquire(&root).unwrap();
        assert!(root.join(LOCK_FILE_NAME).exists());
    }
}
