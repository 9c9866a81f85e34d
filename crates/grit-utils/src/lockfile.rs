//! RAII lock files for atomic writes.
//!
//! Matches C git's lock file protocol:
//! - create `<path>.lock` with O_CREAT|O_EXCL
//! - write the new contents to the lock file
//! - fsync, then atomically rename `.lock` onto the target on commit
//! - remove `.lock` on drop if not committed (rollback)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII lock file guard.
pub struct LockFile {
    /// The target file path (without `.lock` suffix).
    path: PathBuf,
    /// The lock file path (with `.lock` suffix).
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Acquire a lock on the given path.
    ///
    /// Fails with `AlreadyLocked` if another holder has the lock file.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Non-blocking acquire: `Ok(None)` if already locked.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(path) {
            Ok(lk) => Ok(Some(lk)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The target file path (without `.lock`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The lock file path (with `.lock`).
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Commit: flush, fsync, and atomically rename `.lock` onto the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| {
                    UtilError::Lock(LockError::Commit {
                        path: self.lock_path.clone(),
                        source: e,
                    })
                })?;
        }
        // Close the handle before rename (required on some platforms).
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;

        self.committed = true;
        Ok(())
    }

    /// Rollback: remove the lock file without touching the target.
    pub fn rollback(mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.lock_path);
        self.committed = true; // suppress the Drop cleanup
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already committed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already committed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
