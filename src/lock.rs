//! Per-artifact generation locks.
//!
//! Requests for the same thumbnail may be served by independent OS
//! processes, so an in-process mutex is not enough. Each generation attempt
//! takes an exclusive advisory lock (`flock` on Unix, `LockFileEx` on
//! Windows, via `fs4`) on a sibling file `<artifact>.lock`:
//!
//! 1. open (creating if needed) the lock file
//! 2. try a non-blocking exclusive lock
//! 3. on contention, sleep `poll_interval` and retry until `timeout` elapses
//! 4. give up with [`LockError::Timeout`]
//!
//! A lock that turns out to be held on an already-unlinked lock file is
//! retried. The returned [`LockHandle`] best-effort deletes the lock file and
//! releases the lock when dropped, so every exit path of a generation attempt
//! (success, codec error, panic unwinding) lets go of it.
//!
//! A deployment known to be single-process could swap this for a key-striped
//! in-process mutex; a multi-host deployment on a non-shared filesystem
//! would need a real distributed lock instead.

use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("IO error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out after {waited:?} waiting for lock {path}")]
    Timeout { path: PathBuf, waited: Duration },
}

/// Bounded-wait settings for [`acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Path of the lock file guarding `artifact`.
pub fn lock_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// A held generation lock. Released on drop.
#[derive(Debug)]
pub struct LockHandle {
    file: Option<File>,
    path: PathBuf,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly. Equivalent to dropping the handle.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // Unlink while still holding the lock: waiters that wake up on the old
        // inode notice it is gone and reopen.
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), error = %e, "failed to unlock generation lock");
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Acquire the generation lock for `artifact`, polling until `options.timeout`.
pub fn acquire(artifact: &Path, options: &LockOptions) -> Result<LockHandle, LockError> {
    let path = lock_path(artifact);
    let io_err = |source| LockError::Io {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let start = Instant::now();
    loop {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            // A previous holder may have unlinked the file between our open and
            // our lock; a lock on an orphaned inode excludes nobody.
            Ok(()) if !still_linked(&file, &path) => continue,
            Ok(()) => {
                debug!(
                    path = %path.display(),
                    waited_ms = start.elapsed().as_millis() as u64,
                    "acquired generation lock"
                );
                return Ok(LockHandle {
                    file: Some(file),
                    path,
                });
            }
            Err(e) if is_contended(&e) => {
                let waited = start.elapsed();
                if waited >= options.timeout {
                    return Err(LockError::Timeout { path, waited });
                }
                std::thread::sleep(options.poll_interval.min(options.timeout - waited));
            }
            Err(e) => return Err(io_err(e)),
        }
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

// Windows refuses to delete a file that is open elsewhere.
#[cfg(not(unix))]
fn still_linked(_file: &File, _path: &Path) -> bool {
    true
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn fast() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/c/10x10/a-123.webp")),
            PathBuf::from("/c/10x10/a-123.webp.lock")
        );
    }

    #[test]
    fn acquire_creates_parent_and_lock_file() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("10x10/deep/a.webp");

        let handle = acquire(&artifact, &fast()).unwrap();
        assert!(handle.path().exists());
        assert_eq!(handle.path(), lock_path(&artifact));
    }

    #[test]
    fn release_removes_lock_file() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("a.webp");

        let handle = acquire(&artifact, &fast()).unwrap();
        let path = handle.path().to_path_buf();
        handle.release();
        assert!(!path.exists());
    }

    #[test]
    fn drop_releases_lock() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("a.webp");

        {
            let _handle = acquire(&artifact, &fast()).unwrap();
        }
        assert!(!lock_path(&artifact).exists());
        // Re-acquirable immediately
        acquire(&artifact, &fast()).unwrap();
    }

    #[test]
    fn contended_lock_times_out() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("a.webp");
        let _held = acquire(&artifact, &fast()).unwrap();

        let start = Instant::now();
        let err = acquire(&artifact, &fast()).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn waiter_acquires_after_holder_releases() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("a.webp");
        let held = acquire(&artifact, &fast()).unwrap();

        let waiter_artifact = artifact.clone();
        let waiter = std::thread::spawn(move || {
            acquire(
                &waiter_artifact,
                &LockOptions {
                    timeout: Duration::from_secs(5),
                    poll_interval: Duration::from_millis(10),
                },
            )
            .map(|_| ())
        });

        std::thread::sleep(Duration::from_millis(100));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn lock_excludes_concurrent_holders() {
        let tmp = TempDir::new().unwrap();
        let artifact = Arc::new(tmp.path().join("a.webp"));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let artifact = Arc::clone(&artifact);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    let options = LockOptions {
                        timeout: Duration::from_secs(10),
                        poll_interval: Duration::from_millis(5),
                    };
                    let handle = acquire(&artifact, &options).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(handle);
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
