//! Scratch directory management for archive rewriting.
//!
//! Two kinds of scratch space exist: one run-scoped root (`tmp-<random>`
//! under the output directory) and one exclusively-owned directory per
//! rewrite task (`workspace-<random>` under the root). Both are removed on
//! drop, so cleanup happens on success, error return and panic unwind alike.

use std::io;
use std::path::Path;
use tempfile::TempDir;

/// The run-scoped scratch root.
///
/// Holds every per-task scratch directory for one packaging run. Removed
/// recursively when dropped or explicitly closed.
#[derive(Debug)]
pub struct ScratchRoot {
    dir: TempDir,
}

impl ScratchRoot {
    /// Create the scratch root under `base`, creating `base` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(base: impl AsRef<Path>) -> io::Result<Self> {
        let base = base.as_ref();
        std::fs::create_dir_all(base)?;
        let dir = tempfile::Builder::new().prefix("tmp-").tempdir_in(base)?;
        Ok(Self { dir })
    }

    /// Path to the scratch root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the scratch root now, surfacing any removal error.
    ///
    /// A root that has already disappeared is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for any reason other than the
    /// directory being absent.
    pub fn close(self) -> io::Result<()> {
        ignore_missing(self.dir.close())
    }
}

/// A per-task scratch directory, owned by exactly one rewrite task.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Acquire a fresh, uniquely named scratch directory under `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn acquire(base: impl AsRef<Path>) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("workspace-")
            .tempdir_in(base)?;
        Ok(Self { dir })
    }

    /// Path to the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the scratch directory now, surfacing any removal error.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for any reason other than the
    /// directory being absent.
    pub fn close(self) -> io::Result<()> {
        ignore_missing(self.dir.close())
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn root_is_created_and_removed() {
        let base = TempDir::new().unwrap();
        let root = ScratchRoot::create(base.path()).unwrap();
        let path = root.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tmp-"));

        root.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn root_creates_missing_base() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("out");
        let root = ScratchRoot::create(&nested).unwrap();
        assert!(root.path().starts_with(&nested));
    }

    #[test]
    fn scratch_dirs_are_unique() {
        let base = TempDir::new().unwrap();
        let a = ScratchDir::acquire(base.path()).unwrap();
        let b = ScratchDir::acquire(base.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
    }

    #[test]
    fn close_tolerates_already_removed() {
        let base = TempDir::new().unwrap();
        let scratch = ScratchDir::acquire(base.path()).unwrap();
        std::fs::remove_dir_all(scratch.path()).unwrap();
        scratch.close().unwrap();
    }

    #[test]
    fn drop_removes_directory() {
        let base = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchDir::acquire(base.path()).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
