//! Snapshot engine
//!
//! A snapshot is an immutable directory under a backup root, named
//! `YYYYMMDD_HHMMSS` or `YYYYMMDD_HHMMSS_<suffix>`, holding a faithful
//! copy of the source tree plus one `.metadata` record. The engine never
//! creates a snapshot under its final name directly: creation happens in
//! a hidden `.tmp.<token>` stage, and a single atomic rename publishes
//! the result. Observers therefore see either nothing or a complete
//! snapshot, never a partial one.

pub mod creator;
pub mod errors;
pub mod verifier;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::observability::Logger;
use crate::retention::RetentionMode;

pub use errors::{SnapshotError, SnapshotErrorCode, SnapshotResult};
pub use verifier::DIGEST_VERIFY_LIMIT;

/// Prefix of in-progress stage directories inside a backup root
pub const STAGE_PREFIX: &str = ".tmp.";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^20\d{2}[01]\d[0-3]\d_[0-2]\d[0-5]\d[0-5]\d(_[A-Za-z0-9._-]+)?$")
            .expect("static regex")
    })
}

/// Whether a directory name is a legal snapshot name
pub fn is_snapshot_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// Strip every character outside [A-Za-z0-9._-] from a user suffix.
pub fn sanitize_suffix(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Enumerate snapshot names under a backup root, ascending.
///
/// A missing root yields an empty list; snapshot names sort by timestamp
/// because the timestamp leads the name.
pub fn list_snapshots(root: &Path) -> io::Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_snapshot_name(name) {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// The most recent snapshot under a backup root, by name order.
pub fn latest_snapshot(root: &Path) -> io::Result<Option<String>> {
    Ok(list_snapshots(root)?.pop())
}

/// Options for one create call
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Optional name suffix; sanitised at ingress
    pub suffix: Option<String>,
    /// DESCRIPTION metadata field
    pub description: Option<String>,
    /// User tag assignments
    pub tags: Vec<(String, String)>,
    /// User exclusion patterns, appended to the defaults
    pub exclude: Vec<String>,
    /// Verify the stage against the source before publishing
    pub verify: bool,
    /// Hardlink unchanged files against the latest prior snapshot
    pub hardlink: bool,
    /// Retention bound applied after a successful publish
    pub retention: Option<RetentionMode>,
    /// Seconds to wait for the root lock
    pub lock_timeout_secs: u64,
    /// Remove an existing lock before acquiring
    pub force_lock: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            suffix: None,
            description: None,
            tags: Vec::new(),
            exclude: Vec::new(),
            verify: false,
            hardlink: true,
            retention: None,
            lock_timeout_secs: crate::config::DEFAULT_LOCK_TIMEOUT_SECS,
            force_lock: false,
        }
    }
}

/// The snapshot engine, bound to a logger for phase events
pub struct SnapshotEngine<'a> {
    logger: &'a Logger,
}

impl<'a> SnapshotEngine<'a> {
    /// Create an engine
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger }
    }

    /// Produce one snapshot of `source` under `root`.
    ///
    /// Returns the published snapshot name. On any failure the stage is
    /// removed and the lock released; no directory matching the snapshot
    /// name pattern is ever left half-written.
    pub fn create(
        &self,
        source: &Path,
        root: &Path,
        options: &CreateOptions,
    ) -> SnapshotResult<String> {
        creator::create_impl(self.logger, source, root, options)
    }

    /// Post-hoc integrity check of a published snapshot against a source
    /// tree.
    pub fn verify(&self, snapshot_dir: &Path, source: &Path) -> SnapshotResult<()> {
        verifier::verify_snapshot(snapshot_dir, source)
    }
}

/// Path of a named snapshot under a backup root
pub fn snapshot_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}
