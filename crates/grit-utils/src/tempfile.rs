//! Temporary files with RAII cleanup.
//!
//! The temp file is created in the same directory as its eventual target so
//! the final rename stays on one filesystem (and therefore atomic). It is
//! deleted on drop unless persisted.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::Result;

/// A temporary file that renames into place on success.
pub struct TempFile {
    inner: Option<::tempfile::NamedTempFile>,
}

impl TempFile {
    /// Create a temp file in the given directory.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let named = ::tempfile::NamedTempFile::new_in(dir)?;
        Ok(Self { inner: Some(named) })
    }

    /// Create a temp file alongside the given target path.
    pub fn new_for(target: impl AsRef<Path>) -> Result<Self> {
        let dir = target.as_ref().parent().unwrap_or(Path::new("."));
        Self::new_in(dir)
    }

    /// The temp file's current path.
    pub fn path(&self) -> &Path {
        self.inner.as_ref().map(|n| n.path()).unwrap_or(Path::new(""))
    }

    /// fsync the temp file contents.
    pub fn sync_all(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(named) => named.as_file_mut().sync_all(),
            None => Ok(()),
        }
    }

    /// Rename the temp file onto the target path, consuming it.
    pub fn persist(mut self, target: impl AsRef<Path>) -> Result<()> {
        if let Some(named) = self.inner.take() {
            named
                .persist(target.as_ref())
                .map_err(|e| crate::error::UtilError::Io(e.error))?;
        }
        Ok(())
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_persist() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("output.txt");

        let mut tf = TempFile::new_for(&target).unwrap();
        tf.write_all(b"hello world").unwrap();
        tf.persist(&target).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello world");
    }

    #[test]
    fn drop_cleans_up() {
        let dir = ::tempfile::tempdir().unwrap();
        let temp_path;
        {
            let mut tf = TempFile::new_in(dir.path()).unwrap();
            temp_path = tf.path().to_path_buf();
            tf.write_all(b"temporary").unwrap();
            assert!(temp_path.exists());
        }
        assert!(!temp_path.exists());
    }

    #[test]
    fn new_for_lands_in_target_dir() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("sub").join("file.txt");
        fs::create_dir_all(target.parent().unwrap()).unwrap();

        let tf = TempFile::new_for(&target).unwrap();
        assert_eq!(tf.path().parent(), target.parent());
    }
}
