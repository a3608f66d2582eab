//! Single-instance guard: an exclusive `flock` on a well-known file.
//!
//! The file holds the owner's pid while locked and is removed on release.
//!
//! CHANGELOG:
//! - 10/18/2026 - Reject a lock taken on a file unlinked by the previous holder (Phase 3)
//! - 10/18/2026 - Report the holder's pid when the lock is taken (Phase 2)
//! - 10/18/2026 - Initial implementation (Phase 1)

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Cannot init lock {path:?}. reason: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot lock {path:?}, reason: already held by pid {pid}")]
    HeldBy { path: PathBuf, pid: u32 },

    #[error("Cannot lock {path:?}, reason: already held by another process")]
    Held { path: PathBuf },

    #[error("Cannot lock {path:?}, reason: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write pid to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive ownership of the lock file. Released exactly once, by
/// `release` or on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    /// Take the lock without blocking. Fails if another process (or another
    /// open handle in this one) holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| LockError::Open {
                    path: path.clone(),
                    source,
                })?;

            if let Some(lock) = Self::try_lock(&path, file)? {
                return Ok(lock);
            }
            debug!(path = %path.display(), "lock file was replaced while locking, retrying");
        }
    }

    /// Lock an opened handle. `None` when the handle no longer refers to the
    /// file at `path` (a previous holder unlinked it on release); the handle is
    /// closed and the caller reopens.
    fn try_lock(path: &Path, mut file: File) -> Result<Option<Self>, LockError> {
        // SAFETY: the descriptor is owned by `file` and open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let source = io::Error::last_os_error();
            let path = path.to_path_buf();
            if source.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(match read_pid(&path) {
                    Some(pid) => LockError::HeldBy { path, pid },
                    None => LockError::Held { path },
                });
            }
            return Err(LockError::Lock { path, source });
        }

        let linked = is_linked_at(&file, path).map_err(|source| LockError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        if !linked {
            return Ok(None);
        }

        let write_pid = |file: &mut File| -> io::Result<()> {
            file.set_len(0)?;
            writeln!(file, "{}", std::process::id())?;
            file.sync_all()
        };
        write_pid(&mut file).map_err(|source| LockError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "acquired lock");
        Ok(Some(Self {
            path: path.to_path_buf(),
            file: Some(file),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock and remove the lock file.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // A contender that opened the old file before this unlink may still
        // lock it after LOCK_UN; `try_lock` rejects that inode.
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
        // SAFETY: same descriptor as above, still owned by `file`.
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
        drop(file);
        debug!(path = %self.path.display(), "released lock");
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Whether `file` is still the file found at `path` (same device and inode).
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let lock = LockFile::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert_eq!(read_pid(&path), Some(std::process::id()));
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let _held = LockFile::acquire(&path).unwrap();
        match LockFile::acquire(&path) {
            Err(LockError::HeldBy { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected HeldBy, got {:?}", other),
        }
    }

    #[test]
    fn test_release_removes_file_and_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let lock = LockFile::acquire(&path).unwrap();
        lock.release();
        assert!(!path.exists());

        let again = LockFile::acquire(&path).unwrap();
        drop(again);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_file_without_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");
        std::fs::write(&path, "999999\n").unwrap();

        let _lock = LockFile::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
    }

    #[test]
    fn test_missing_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("app.lock");

        assert!(matches!(
            LockFile::acquire(&path),
            Err(LockError::Open { .. })
        ));
    }

    #[test]
    fn test_contender_holding_unlinked_file_does_not_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");

        let first = LockFile::acquire(&path).unwrap();
        // A contender opens the file before the holder releases and unlinks it.
        let early = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        first.release();

        // Its flock now succeeds on the unlinked inode, which must not count.
        assert!(LockFile::try_lock(&path, early).unwrap().is_none());

        let owner = LockFile::acquire(&path).unwrap();
        assert!(matches!(
            LockFile::acquire(&path),
            Err(LockError::HeldBy { .. })
        ));
        drop(owner);
    }

    #[test]
    fn test_handle_on_current_file_is_linked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.lock");
        let file = File::create(&path).unwrap();

        assert!(is_linked_at(&file, &path).unwrap());
        std::fs::remove_file(&path).unwrap();
        assert!(!is_linked_at(&file, &path).unwrap());
    }
}
