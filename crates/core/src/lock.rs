//! Scoped advisory locks for files shared between processes.
//!
//! On unix and windows the lock is an OS advisory lock (`flock` / `LockFileEx` via fs2).
//! Other targets get a no-op guard, which limits manifest safety to a single
//! process.

use std::fs::File;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holds an advisory lock on `file` until dropped.
#[derive(Debug)]
pub struct ManifestLock<'a> {
    file: &'a File,
    mode: LockMode,
}

impl<'a> ManifestLock<'a> {
    pub fn acquire(file: &'a File, mode: LockMode) -> io::Result<Self> {
        os::lock(file, mode)?;
        Ok(Self { file, mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn file(&self) -> &File {
        self.file
    }
}

impl Drop for ManifestLock<'_> {
    fn drop(&mut self) {
        let _ = os::unlock(self.file);
    }
}

#[cfg(any(unix, windows))]
mod os {
    use std::fs::File;
    use std::io;

    use fs2::FileExt;

    use super::LockMode;

    pub(super) fn lock(file: &File, mode: LockMode) -> io::Result<()> {
        match mode {
            LockMode::Shared => FileExt::lock_shared(file),
            LockMode::Exclusive => FileExt::lock_exclusive(file),
        }
    }

    pub(super) fn unlock(file: &File) -> io::Result<()> {
        FileExt::unlock(file)
    }
}

#[cfg(not(any(unix, windows)))]
mod os {
    use std::fs::File;
    use std::io;

    use super::LockMode;

    pub(super) fn lock(_file: &File, _mode: LockMode) -> io::Result<()> {
        Ok(())
    }

    pub(super) fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;

    use tempfile::TempDir;

    use super::{LockMode, ManifestLock};

    #[test]
    fn shared_locks_coexist_and_release_on_drop() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("manifest.json");
        let first = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .expect("open first");
        let second = OpenOptions::new()
            .read(true)
            .open(&path)
            .expect("open second");

        {
            let a = ManifestLock::acquire(&first, LockMode::Shared).expect("shared a");
            let b = ManifestLock::acquire(&second, LockMode::Shared).expect("shared b");
            assert_eq!(a.mode(), LockMode::Shared);
            assert_eq!(b.mode(), LockMode::Shared);
        }

        let exclusive = ManifestLock::acquire(&first, LockMode::Exclusive).expect("exclusive");
        assert_eq!(exclusive.mode(), LockMode::Exclusive);
    }
}
