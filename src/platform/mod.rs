//! Path and platform introspection layer
//!
//! Everything the engines need to know about the host lives here:
//! canonical paths, ownership, free disk space, timestamps, and process
//! aliveness. The rest of the core depends only on this interface, never
//! on the platform APIs directly.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::Local;
use nix::sys::signal::kill;
use nix::sys::statvfs::statvfs;
use nix::unistd::{Gid, Group, Pid, Uid, User};
use thiserror::Error;
use walkdir::WalkDir;

/// Platform layer errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("path does not exist: {0}")]
    Missing(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("filesystem probe failed at {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

impl PlatformError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            PlatformError::Missing(path.to_path_buf())
        } else {
            PlatformError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Canonicalize a path: absolute, symlinks resolved, no trailing slash.
///
/// Idempotent: canonicalizing a canonical path returns it unchanged.
pub fn canonicalize(path: &Path) -> PlatformResult<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| PlatformError::io(path, e))
}

/// Owner of a filesystem entry as a (user, group) name pair.
///
/// Falls back to numeric ids when the uid/gid has no database entry.
pub fn owner(path: &Path) -> PlatformResult<(String, String)> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| PlatformError::io(path, e))?;

    let user = match User::from_uid(Uid::from_raw(meta.uid())) {
        Ok(Some(u)) => u.name,
        _ => meta.uid().to_string(),
    };
    let group = match Group::from_gid(Gid::from_raw(meta.gid())) {
        Ok(Some(g)) => g.name,
        _ => meta.gid().to_string(),
    };

    Ok((user, group))
}

/// Name of the invoking user, numeric uid as fallback.
pub fn current_user() -> String {
    let uid = Uid::effective();
    match User::from_uid(uid) {
        Ok(Some(u)) => u.name,
        _ => uid.as_raw().to_string(),
    }
}

/// Whether the effective uid is root.
pub fn is_effective_root() -> bool {
    Uid::effective().is_root()
}

/// Hostname of this machine.
pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Kilobytes available to unprivileged users on the filesystem holding `path`.
pub fn disk_free_kb(path: &Path) -> PlatformResult<u64> {
    let stat = statvfs(path).map_err(|e| PlatformError::Probe {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64 / 1024)
}

/// Total size of all regular files under `path`, in kilobytes (rounded up).
///
/// Symlinks are not followed; unreadable entries are skipped rather than
/// failing the whole probe.
pub fn tree_size_kb(path: &Path) -> PlatformResult<u64> {
    if !path.exists() {
        return Err(PlatformError::Missing(path.to_path_buf()));
    }

    let mut bytes: u64 = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                bytes += meta.len();
            }
        }
    }

    Ok(bytes.div_ceil(1024))
}

/// Local timestamp in snapshot-name form: `YYYYMMDD_HHMMSS`.
pub fn timestamp_now() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Express `target` relative to `base`, or return `target` unchanged when
/// that is infeasible (different trees, relative inputs).
pub fn relative_to(base: &Path, target: &Path) -> PathBuf {
    match target.strip_prefix(base) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => target.to_path_buf(),
    }
}

/// Whether a process with the given pid is currently running.
///
/// Signal 0 performs an existence check without delivering anything.
/// EPERM still means the process exists.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}
