//! Restore engine
//!
//! Restores a snapshot into a target directory, defaulting to the SOURCE
//! recorded in the snapshot's metadata. The protocol:
//!
//! 1. With `diff_first`, run the live comparison, show it, and await
//!    confirmation (bounded; a timeout aborts).
//! 2. With `dry_run`, list the would-be changes and stop.
//! 3. Otherwise mirror snapshot → target with mode, ownership, and times
//!    preserved, restricted to the pattern list when one is given.
//! 4. Merge semantics by default: matching entries are added or
//!    overwritten, everything else in the target is left alone. A
//!    full-replace flag opts into deleting entries absent from the
//!    snapshot.
//!
//! Restore is deliberately not atomic with respect to the target. Each
//! failing file operation is recorded and counted; a report with failures
//! makes the restore partial.

pub mod errors;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::compare::CompareEngine;
use crate::exclude::PatternFilter;
use crate::metadata::{self, METADATA_FILE};
use crate::observability::Logger;
use crate::platform;

pub use errors::{RestoreError, RestoreErrorCode, RestoreResult};

/// Outcome of a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    TimedOut,
}

/// The seam between the engine and whatever answers prompts.
///
/// The CLI supplies a stdin-backed implementation with a deadline; tests
/// supply stubs.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> Confirmation;
}

/// Confirmer that always says yes (auto-confirm mode)
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> Confirmation {
        Confirmation::Yes
    }
}

/// Options for one restore call
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Target directory; None means the recorded SOURCE
    pub target: Option<PathBuf>,
    /// Restrict the restore to matching relative paths
    pub patterns: Vec<String>,
    /// Enumerate changes without writing
    pub dry_run: bool,
    /// Show the live diff and ask before writing
    pub diff_first: bool,
    /// Delete target entries absent from the snapshot
    pub full_replace: bool,
}

/// What one restore call did (or would do, for dry runs)
#[derive(Debug, Default, serde::Serialize)]
pub struct RestoreReport {
    /// Resolved target directory
    pub target: PathBuf,
    /// Entries written
    pub restored: Vec<PathBuf>,
    /// Entries deleted (full-replace only)
    pub deleted: Vec<PathBuf>,
    /// Dry-run action listing
    pub planned: Vec<String>,
    /// Per-file failures as (path, reason)
    pub failed: Vec<(PathBuf, String)>,
}

impl RestoreReport {
    /// Whether any per-file operation failed
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// The restore engine
pub struct RestoreEngine<'a> {
    logger: &'a Logger,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger }
    }

    /// Restore `snapshot_dir` according to `options`.
    pub fn restore(
        &self,
        snapshot_dir: &Path,
        options: &RestoreOptions,
        confirmer: &dyn Confirmer,
    ) -> RestoreResult<RestoreReport> {
        let snapshot_dir = platform::canonicalize(snapshot_dir)
            .map_err(|e| RestoreError::failed(format!("Snapshot not usable: {}", e)))?;
        if !snapshot_dir.is_dir() {
            return Err(RestoreError::failed(format!(
                "Snapshot is not a directory: {}",
                snapshot_dir.display()
            )));
        }

        let target = self.resolve_target(&snapshot_dir, options)?;
        let filter = PatternFilter::build(&options.patterns)
            .map_err(|e| RestoreError::failed(format!("Invalid pattern: {}", e)))?;

        // Step 1: pre-restore diff and confirmation
        if options.diff_first && target.exists() {
            let report = CompareEngine::new(self.logger)
                .compare_with_live(&snapshot_dir, &target, &options.patterns, true)
                .map_err(|e| RestoreError::io_error("Pre-restore diff failed", e))?;
            println!("{}", report);

            if !report.has_differences() {
                self.logger.info("RESTORE_NO_CHANGES", &[]);
            }

            match confirmer.confirm("Proceed with restore? [y/N] ") {
                Confirmation::Yes => {}
                Confirmation::No => return Err(RestoreError::cancelled("declined")),
                Confirmation::TimedOut => {
                    return Err(RestoreError::cancelled("confirmation timed out"))
                }
            }
        }

        let mut report = RestoreReport {
            target: target.clone(),
            ..RestoreReport::default()
        };

        let entries = self.collect_snapshot_entries(&snapshot_dir, &filter, &mut report);

        // Step 2: dry run stops before any write
        if options.dry_run {
            for (rel, _) in &entries {
                report.planned.push(format!("restore {}", rel.display()));
            }
            if options.full_replace && target.exists() {
                for rel in self.surplus_entries(&target, &entries, &filter) {
                    report.planned.push(format!("delete {}", rel.display()));
                }
            }
            return Ok(report);
        }

        // Step 3: mirror
        if !target.exists() {
            fs::create_dir_all(&target).map_err(|e| {
                RestoreError::io_error(
                    format!("Failed to create target: {}", target.display()),
                    e,
                )
            })?;
        }

        let mut dir_times: Vec<(PathBuf, FileTime, FileTime)> = Vec::new();
        for (rel, kind) in &entries {
            let from = snapshot_dir.join(rel);
            let to = target.join(rel);
            match self.restore_entry(&from, &to, *kind, &mut dir_times) {
                Ok(()) => report.restored.push(rel.clone()),
                Err(e) => report.failed.push((rel.clone(), e.to_string())),
            }
        }
        for (path, atime, mtime) in dir_times.iter().rev() {
            let _ = filetime::set_file_times(path, *atime, *mtime);
        }

        // Step 4: subtractive pass, only on explicit request
        if options.full_replace {
            for rel in self.surplus_entries(&target, &entries, &filter) {
                let victim = target.join(&rel);
                let result = if victim.is_dir() {
                    fs::remove_dir_all(&victim)
                } else {
                    fs::remove_file(&victim)
                };
                match result {
                    Ok(()) => report.deleted.push(rel),
                    Err(e) => report.failed.push((rel, e.to_string())),
                }
            }
        }

        self.logger.info(
            "RESTORE_DONE",
            &[
                ("deleted", &report.deleted.len().to_string()),
                ("failed", &report.failed.len().to_string()),
                ("restored", &report.restored.len().to_string()),
                ("target", &target.display().to_string()),
            ],
        );

        Ok(report)
    }

    /// Target priority: explicit option, then the SOURCE recorded in the
    /// snapshot's metadata.
    fn resolve_target(
        &self,
        snapshot_dir: &Path,
        options: &RestoreOptions,
    ) -> RestoreResult<PathBuf> {
        if let Some(target) = &options.target {
            return Ok(target.clone());
        }

        let record = metadata::read(snapshot_dir).map_err(|e| {
            RestoreError::failed(format!(
                "No restore target given and the snapshot metadata is unreadable: {}",
                e
            ))
        })?;
        match record.get("SOURCE") {
            Some(source) if !source.is_empty() => Ok(PathBuf::from(source)),
            _ => Err(RestoreError::failed(
                "No restore target given and the snapshot records no SOURCE",
            )),
        }
    }

    /// Entries to restore, in path order: (relative path, kind).
    fn collect_snapshot_entries(
        &self,
        snapshot_dir: &Path,
        filter: &PatternFilter,
        report: &mut RestoreReport,
    ) -> Vec<(PathBuf, EntryKind)> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(snapshot_dir).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    report
                        .failed
                        .push((PathBuf::from("<walk>"), e.to_string()));
                    continue;
                }
            };
            let rel = match entry.path().strip_prefix(snapshot_dir) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };
            // The metadata record belongs to the snapshot, not the data
            if rel == Path::new(METADATA_FILE) {
                continue;
            }

            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };

            // Directories pass when unrestricted; under a restriction
            // they only materialise as parents of matching files
            if kind != EntryKind::Dir && !filter.matches(&rel) {
                continue;
            }
            if kind == EntryKind::Dir && filter.is_restricted() {
                continue;
            }

            entries.push((rel, kind));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Restore one entry, overwriting whatever occupies the target path.
    fn restore_entry(
        &self,
        from: &Path,
        to: &Path,
        kind: EntryKind,
        dir_times: &mut Vec<(PathBuf, FileTime, FileTime)>,
    ) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        match kind {
            EntryKind::Dir => {
                if to.symlink_metadata().map(|m| !m.is_dir()).unwrap_or(false) {
                    fs::remove_file(to)?;
                }
                if !to.exists() {
                    fs::create_dir_all(to)?;
                }
                let meta = fs::metadata(from)?;
                fs::set_permissions(to, meta.permissions())?;
                preserve_owner(&meta, to);
                dir_times.push((
                    to.to_path_buf(),
                    FileTime::from_last_access_time(&meta),
                    FileTime::from_last_modification_time(&meta),
                ));
            }
            EntryKind::Symlink => {
                let link_target = fs::read_link(from)?;
                remove_occupant(to)?;
                std::os::unix::fs::symlink(&link_target, to)?;
                let meta = from.symlink_metadata()?;
                let _ =
                    std::os::unix::fs::lchown(to, Some(meta.uid()), Some(meta.gid()));
                let _ = filetime::set_symlink_file_times(
                    to,
                    FileTime::from_last_access_time(&meta),
                    FileTime::from_last_modification_time(&meta),
                );
            }
            EntryKind::File => {
                let meta = fs::metadata(from)?;
                if to
                    .symlink_metadata()
                    .map(|m| !m.is_file())
                    .unwrap_or(false)
                {
                    remove_occupant(to)?;
                }
                fs::copy(from, to)?;
                preserve_owner(&meta, to);
                filetime::set_file_times(
                    to,
                    FileTime::from_last_access_time(&meta),
                    FileTime::from_last_modification_time(&meta),
                )?;
            }
        }
        Ok(())
    }

    /// Target entries with no counterpart in the snapshot set, deepest
    /// first so files go before their directories.
    fn surplus_entries(
        &self,
        target: &Path,
        entries: &[(PathBuf, EntryKind)],
        filter: &PatternFilter,
    ) -> Vec<PathBuf> {
        let keep: BTreeSet<&PathBuf> = entries.iter().map(|(rel, _)| rel).collect();
        let mut surplus = Vec::new();

        for entry in WalkDir::new(target).follow_links(false) {
            let Ok(entry) = entry else { continue };
            let rel = match entry.path().strip_prefix(target) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };
            if keep.contains(&rel) {
                continue;
            }
            // A directory that holds kept entries must survive
            if entry.file_type().is_dir() && keep.iter().any(|k| k.starts_with(&rel)) {
                continue;
            }
            if !filter.matches(&rel) && !entry.file_type().is_dir() {
                continue;
            }
            surplus.push(rel);
        }

        // Deepest first
        surplus.sort_by(|a, b| b.components().count().cmp(&a.components().count()));
        surplus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink,
}

fn remove_occupant(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => Ok(()),
    }
}

fn preserve_owner(meta: &fs::Metadata, target: &Path) {
    let _ = std::os::unix::fs::chown(target, Some(meta.uid()), Some(meta.gid()));
}
