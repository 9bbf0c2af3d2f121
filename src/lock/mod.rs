//! Crash-safe directory lock for a backup root
//!
//! The lock is a directory `.checkpoint.lock` inside the backup root; its
//! atomic creation (`mkdir`) conveys acquisition, so there is no race
//! between check and take. Two files inside record the holder:
//!
//! - `pid`       ASCII decimal pid of the holder
//! - `timestamp` ASCII decimal epoch seconds at acquisition
//!
//! Acquisition protocol:
//! 1. Try exclusive directory creation. Success: write pid + timestamp,
//!    return a handle.
//! 2. Directory exists: read `pid`. Absent, malformed, or dead process
//!    means the lock is STALE: remove it and retry immediately. A live
//!    holder means sleep 1s, decrement the timeout, retry; at zero fail
//!    with CKPT_LOCK_TIMEOUT.
//! 3. `force` removes any existing lock before the first attempt.
//!
//! Release re-reads `pid` and refuses when it no longer matches the
//! handle (CKPT_LOCK_STOLEN). A process only ever deletes a lock it still
//! owns, except through `force_release`. The handle releases on drop so
//! every exit path unwinds the lock.

pub mod errors;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::observability::Logger;
use crate::platform;

pub use errors::{LockError, LockErrorCode, LockResult};

/// Name of the lock directory inside a backup root
pub const LOCK_DIR_NAME: &str = ".checkpoint.lock";

/// Returns the lock directory path for a backup root
pub fn lock_dir(root: &Path) -> PathBuf {
    root.join(LOCK_DIR_NAME)
}

/// An acquired lock, bound to one backup root and this process
#[derive(Debug)]
pub struct LockHandle {
    root: PathBuf,
    pid: u32,
    released: bool,
}

impl LockHandle {
    /// The backup root this handle guards
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The pid recorded at acquisition
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Release the lock. Idempotent: a second call is a no-op.
    ///
    /// Refuses with CKPT_LOCK_STOLEN when the on-disk pid no longer
    /// matches this handle.
    pub fn release(&mut self) -> LockResult<()> {
        if self.released {
            return Ok(());
        }

        let dir = lock_dir(&self.root);
        if !dir.exists() {
            // Already gone (force_release or crash cleanup); nothing to do
            self.released = true;
            return Ok(());
        }

        match read_pid(&dir) {
            Some(pid) if pid == self.pid as i32 => {}
            _ => return Err(LockError::stolen(&self.root, self.pid)),
        }

        fs::remove_dir_all(&dir).map_err(|e| {
            LockError::io_error(format!("Failed to remove lock {}", dir.display()), e)
        })?;
        self.released = true;
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        // Best effort; a stolen lock is not ours to delete
        let _ = self.release();
    }
}

/// Acquire the lock on `root`, waiting up to `timeout_secs` for a live
/// holder to release. `force` removes any existing lock first.
pub fn acquire(
    root: &Path,
    timeout_secs: u64,
    force: bool,
    logger: &Logger,
) -> LockResult<LockHandle> {
    let dir = lock_dir(root);

    if force && dir.exists() {
        logger.warn(
            "LOCK_FORCED",
            &[("root", &root.display().to_string())],
        );
        fs::remove_dir_all(&dir).map_err(|e| {
            LockError::io_error(format!("Failed to force-remove lock {}", dir.display()), e)
        })?;
    }

    let mut remaining = timeout_secs;

    loop {
        match fs::create_dir(&dir) {
            Ok(()) => return write_holder(root, &dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(LockError::io_error(
                    format!("Failed to create lock {}", dir.display()),
                    e,
                ))
            }
        }

        // Lock exists. A missing, malformed, or dead pid marks it stale.
        match read_pid(&dir) {
            Some(pid) if platform::process_alive(pid) => {
                if remaining == 0 {
                    return Err(LockError::timeout(root, timeout_secs));
                }
                thread::sleep(Duration::from_secs(1));
                remaining -= 1;
            }
            other => {
                let pid_text = other.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                logger.warn(
                    "LOCK_STALE_RECLAIMED",
                    &[
                        ("pid", pid_text.as_str()),
                        ("root", &root.display().to_string()),
                    ],
                );
                // Removal may race another reclaimer; retry regardless
                let _ = fs::remove_dir_all(&dir);
            }
        }
    }
}

/// Delete the lock unconditionally, whoever holds it.
pub fn force_release(root: &Path) -> LockResult<()> {
    let dir = lock_dir(root);
    if !dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(&dir).map_err(|e| {
        LockError::io_error(format!("Failed to remove lock {}", dir.display()), e)
    })
}

/// Write the holder records after winning the mkdir race.
fn write_holder(root: &Path, dir: &Path) -> LockResult<LockHandle> {
    let pid = std::process::id();

    let result = fs::write(dir.join("pid"), pid.to_string()).and_then(|_| {
        fs::write(dir.join("timestamp"), Utc::now().timestamp().to_string())
    });

    if let Err(e) = result {
        // The half-written lock would read as stale to everyone else, but
        // do not leave it behind
        let _ = fs::remove_dir_all(dir);
        return Err(LockError::io_error(
            format!("Failed to record lock holder in {}", dir.display()),
            e,
        ));
    }

    Ok(LockHandle {
        root: root.to_path_buf(),
        pid,
        released: false,
    })
}

/// Read and parse the pid file of an existing lock.
fn read_pid(dir: &Path) -> Option<i32> {
    let text = fs::read_to_string(dir.join("pid")).ok()?;
    text.trim().parse::<i32>().ok()
}
