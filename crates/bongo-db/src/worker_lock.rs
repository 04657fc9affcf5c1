//! Exclusive ownership of a notes root by one update worker.
//!
//! Uses `flock(2)` on `{root}/.worker.lock`. The lock belongs to the open file,
//! so it is released when the [`WorkerLock`] is dropped or the process exits,
//! and a second lock attempt conflicts even within the same process.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use bongo_core::defaults::WORKER_LOCK_FILE_NAME;
use bongo_core::{Error, Result};

/// RAII guard proving this process owns the notes root's update worker.
#[derive(Debug)]
pub struct WorkerLock {
    file: File,
    path: PathBuf,
}

impl WorkerLock {
    /// Take the worker lock under `root` without waiting.
    ///
    /// Fails with [`Error::WorkerActive`] when another worker holds it.
    pub fn acquire(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(WORKER_LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        loop {
            // SAFETY: flock is safe on a valid file descriptor
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => {
                    warn!(path = %path.display(), "Worker lock already held");
                    return Err(Error::WorkerActive(path.display().to_string()));
                }
                _ => return Err(err.into()),
            }
        }

        debug!(path = %path.display(), "Acquired worker lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkerLock {
    fn drop(&mut self) {
        // SAFETY: flock with LOCK_UN is safe on a valid file descriptor
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        debug!(path = %self.path.display(), "Released worker lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_worker_is_refused() {
        let dir = TempDir::new().unwrap();
        let first = WorkerLock::acquire(dir.path()).unwrap();

        match WorkerLock::acquire(dir.path()) {
            Err(Error::WorkerActive(path)) => assert!(path.ends_with(WORKER_LOCK_FILE_NAME)),
            other => panic!("expected WorkerActive, got {:?}", other),
        }
        assert_eq!(first.path(), dir.path().join(WORKER_LOCK_FILE_NAME));
    }

    #[test]
    fn test_lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        drop(WorkerLock::acquire(dir.path()).unwrap());
        WorkerLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn test_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/notes");
        WorkerLock::acquire(&root).unwrap();
        assert!(root.join(WORKER_LOCK_FILE_NAME).exists());
    }
}
