//! Retention policy: count- and age-based snapshot rotation
//!
//! Snapshots are enumerated by name; the name carries the timestamp, so
//! sorting names sorts by age and the age rule parses the name rather
//! than trusting mtime (which restores and copies disturb).
//!
//! Deletions run oldest-first. The most recent snapshot is never removed,
//! with one exception: `keep_n(0)` in prune-only mode empties the root.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{Local, NaiveDateTime};

use crate::observability::Logger;
use crate::snapshot::list_snapshots;

/// A retention bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    /// Keep the N most recent snapshots
    KeepN(usize),
    /// Delete snapshots older than D days
    MaxAgeDays(u32),
}

/// Parse the timestamp encoded in a snapshot name.
///
/// Returns None for names that fail the pattern (callers only hand in
/// validated names, but retention must not panic on a surprise).
pub fn parse_name_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.get(0..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok()
}

/// Decide which snapshots a bound removes. Pure: works on names alone.
///
/// The returned list is ordered oldest-first, the order deletions must
/// run in.
pub fn select_victims(
    names: &[String],
    mode: &RetentionMode,
    prune_only: bool,
    now: NaiveDateTime,
) -> Vec<String> {
    let mut sorted = names.to_vec();
    sorted.sort();

    match mode {
        RetentionMode::KeepN(n) => {
            let mut keep = *n;
            // The newest snapshot survives keep_n(0) unless the caller is
            // explicitly pruning
            if keep == 0 && !prune_only {
                keep = 1;
            }
            if sorted.len() <= keep {
                return Vec::new();
            }
            let cut = sorted.len() - keep;
            sorted.truncate(cut);
            sorted
        }
        RetentionMode::MaxAgeDays(days) => {
            let cutoff = now - chrono::Duration::seconds(*days as i64 * 86_400);
            let newest = sorted.last().cloned();
            sorted
                .into_iter()
                .filter(|name| {
                    if Some(name) == newest.as_ref() {
                        return false;
                    }
                    parse_name_timestamp(name).is_some_and(|t| t < cutoff)
                })
                .collect()
        }
    }
}

/// Apply a retention bound under `root`, deleting whole snapshots.
///
/// Returns the deleted names, oldest first.
pub fn apply(
    root: &Path,
    mode: &RetentionMode,
    prune_only: bool,
    logger: &Logger,
) -> io::Result<Vec<String>> {
    let names = list_snapshots(root)?;
    let victims = select_victims(&names, mode, prune_only, Local::now().naive_local());

    for name in &victims {
        let path = root.join(name);
        fs::remove_dir_all(&path)?;
        logger.info("SNAPSHOT_PRUNED", &[("name", name.as_str())]);
    }

    Ok(victims)
}
