//! Post-copy verification of a snapshot against its source
//!
//! Both trees are enumerated and compared pairwise. Size is always the
//! first check. Small trees get a content digest per file; large trees
//! degrade to (size, mtime) equality to bound I/O. A size-only checksum
//! provider forces the degraded comparison regardless of tree size.
//!
//! The first disagreement aborts with CKPT_VERIFY_MISMATCH.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use super::errors::{SnapshotError, SnapshotResult};
use crate::checksum::Provider;
use crate::exclude::ExclusionSet;
use crate::metadata::METADATA_FILE;
use crate::platform;

/// Trees with more entries than this compare by (size, mtime) instead of
/// digest.
pub const DIGEST_VERIFY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Symlink,
}

/// Standalone verification of a published snapshot.
pub fn verify_snapshot(snapshot_dir: &Path, source: &Path) -> SnapshotResult<()> {
    let snapshot_dir = platform::canonicalize(snapshot_dir)
        .map_err(|e| SnapshotError::failed(format!("Snapshot not usable: {}", e)))?;
    let source = platform::canonicalize(source)
        .map_err(|e| SnapshotError::failed(format!("Source not usable: {}", e)))?;

    // Keep the backup root out of the comparison when it nests under the
    // source
    let root_rel = snapshot_dir
        .parent()
        .map(|parent| platform::relative_to(&source, parent));
    let exclusions = ExclusionSet::build(&[], root_rel.as_deref())
        .map_err(|e| SnapshotError::failed(format!("Invalid exclusion pattern: {}", e)))?;

    verify_trees(&source, &snapshot_dir, &exclusions, &Provider::select())
}

/// Compare a source tree against a snapshot (or stage) tree.
pub(crate) fn verify_trees(
    source: &Path,
    snapshot: &Path,
    exclusions: &ExclusionSet,
    provider: &Provider,
) -> SnapshotResult<()> {
    let source_entries = collect_entries(source, Some(exclusions))
        .map_err(|e| SnapshotError::io_error("Failed to enumerate source", e))?;
    let snapshot_entries = collect_entries(snapshot, None)
        .map_err(|e| SnapshotError::io_error("Failed to enumerate snapshot", e))?;

    let digest_mode =
        !provider.is_size_only() && source_entries.len() <= DIGEST_VERIFY_LIMIT;

    for (rel, kind) in &source_entries {
        let Some(snap_kind) = snapshot_entries.get(rel) else {
            return Err(SnapshotError::verify_mismatch(format!(
                "{} missing from snapshot",
                rel.display()
            )));
        };
        if kind != snap_kind {
            return Err(SnapshotError::verify_mismatch(format!(
                "{} changed type",
                rel.display()
            )));
        }

        let src_path = source.join(rel);
        let snap_path = snapshot.join(rel);

        match kind {
            EntryKind::Symlink => {
                let src_target = fs::read_link(&src_path)
                    .map_err(|e| SnapshotError::io_error_at_path(&src_path, e))?;
                let snap_target = fs::read_link(&snap_path)
                    .map_err(|e| SnapshotError::io_error_at_path(&snap_path, e))?;
                if src_target != snap_target {
                    return Err(SnapshotError::verify_mismatch(format!(
                        "{} symlink target differs",
                        rel.display()
                    )));
                }
            }
            EntryKind::File => {
                verify_file_pair(rel, &src_path, &snap_path, digest_mode, provider)?;
            }
        }
    }

    for rel in snapshot_entries.keys() {
        if !source_entries.contains_key(rel) {
            return Err(SnapshotError::verify_mismatch(format!(
                "{} present in snapshot but not in source",
                rel.display()
            )));
        }
    }

    Ok(())
}

fn verify_file_pair(
    rel: &Path,
    src_path: &Path,
    snap_path: &Path,
    digest_mode: bool,
    provider: &Provider,
) -> SnapshotResult<()> {
    let src_meta = fs::metadata(src_path)
        .map_err(|e| SnapshotError::io_error_at_path(src_path, e))?;
    let snap_meta = fs::metadata(snap_path)
        .map_err(|e| SnapshotError::io_error_at_path(snap_path, e))?;

    // Size first; it is the cheapest disagreement
    if src_meta.len() != snap_meta.len() {
        return Err(SnapshotError::verify_mismatch(format!(
            "{} size differs ({} vs {})",
            rel.display(),
            src_meta.len(),
            snap_meta.len()
        )));
    }

    if digest_mode {
        let src_digest = provider
            .digest(src_path)
            .map_err(|e| SnapshotError::io_error_at_path(src_path, e))?;
        let snap_digest = provider
            .digest(snap_path)
            .map_err(|e| SnapshotError::io_error_at_path(snap_path, e))?;
        if src_digest != snap_digest {
            return Err(SnapshotError::verify_mismatch(format!(
                "{} content differs",
                rel.display()
            )));
        }
    } else {
        let src_mtime = FileTime::from_last_modification_time(&src_meta);
        let snap_mtime = FileTime::from_last_modification_time(&snap_meta);
        if src_mtime != snap_mtime {
            return Err(SnapshotError::verify_mismatch(format!(
                "{} mtime differs",
                rel.display()
            )));
        }
    }

    Ok(())
}

/// Collect files and symlinks under `root` as relative paths.
///
/// With exclusions the traversal skips excluded subtrees (source side);
/// without, only the `.metadata` record is ignored (snapshot side).
fn collect_entries(
    root: &Path,
    exclusions: Option<&ExclusionSet>,
) -> io::Result<BTreeMap<PathBuf, EntryKind>> {
    let mut entries = BTreeMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let Some(excl) = exclusions else { return true };
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel,
                Err(_) => return true,
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            !excl.is_excluded(rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let message = e.to_string();
            e.into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message))
        })?;
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        if exclusions.is_none() && rel == Path::new(METADATA_FILE) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            entries.insert(rel, EntryKind::Symlink);
        } else if file_type.is_file() {
            entries.insert(rel, EntryKind::File);
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Algorithm;
    use tempfile::TempDir;

    fn setup_pair(temp_dir: &TempDir) -> (PathBuf, PathBuf) {
        let source = temp_dir.path().join("src");
        let snapshot = temp_dir.path().join("snap");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&snapshot).unwrap();

        for dir in [&source, &snapshot] {
            fs::write(dir.join("a.txt"), b"hi").unwrap();
            fs::create_dir(dir.join("sub")).unwrap();
            fs::write(dir.join("sub").join("b.txt"), b"yo").unwrap();
        }
        (source, snapshot)
    }

    fn defaults() -> ExclusionSet {
        ExclusionSet::defaults().unwrap()
    }

    #[test]
    fn test_identical_trees_pass() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);

        let result = verify_trees(&source, &snapshot, &defaults(), &Provider::select());
        assert!(result.is_ok());
    }

    #[test]
    fn test_metadata_record_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        fs::write(snapshot.join(METADATA_FILE), b"SOURCE=/x\n").unwrap();

        let result = verify_trees(&source, &snapshot, &defaults(), &Provider::select());
        assert!(result.is_ok());
    }

    #[test]
    fn test_content_change_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        // Same size, different bytes
        fs::write(snapshot.join("a.txt"), b"ho").unwrap();

        let err = verify_trees(&source, &snapshot, &defaults(), &Provider::select())
            .unwrap_err();
        assert!(err.message().contains("a.txt"));
    }

    #[test]
    fn test_size_change_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        fs::write(snapshot.join("a.txt"), b"longer than before").unwrap();

        let err = verify_trees(&source, &snapshot, &defaults(), &Provider::select())
            .unwrap_err();
        assert!(err.message().contains("size differs"));
    }

    #[test]
    fn test_missing_file_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        fs::remove_file(snapshot.join("sub").join("b.txt")).unwrap();

        let err = verify_trees(&source, &snapshot, &defaults(), &Provider::select())
            .unwrap_err();
        assert!(err.message().contains("missing from snapshot"));
    }

    #[test]
    fn test_extra_file_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        fs::write(snapshot.join("extra.txt"), b"surprise").unwrap();

        let err = verify_trees(&source, &snapshot, &defaults(), &Provider::select())
            .unwrap_err();
        assert!(err.message().contains("present in snapshot"));
    }

    #[test]
    fn test_symlink_target_compared() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        std::os::unix::fs::symlink("a.txt", source.join("link")).unwrap();
        std::os::unix::fs::symlink("b.txt", snapshot.join("link")).unwrap();

        let err = verify_trees(&source, &snapshot, &defaults(), &Provider::select())
            .unwrap_err();
        assert!(err.message().contains("symlink target differs"));
    }

    #[test]
    fn test_excluded_entries_not_expected() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);
        // Excluded on the source side, so legitimately absent from the
        // snapshot
        fs::create_dir(source.join("tmp")).unwrap();
        fs::write(source.join("tmp").join("junk"), b"x").unwrap();

        let result = verify_trees(&source, &snapshot, &defaults(), &Provider::select());
        assert!(result.is_ok());
    }

    #[test]
    fn test_size_only_provider_compares_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let (source, snapshot) = setup_pair(&temp_dir);

        // Align mtimes so the degraded comparison passes despite byte
        // differences the digest would have caught
        fs::write(snapshot.join("a.txt"), b"ho").unwrap();
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(source.join("a.txt"), mtime, mtime).unwrap();
        filetime::set_file_times(snapshot.join("a.txt"), mtime, mtime).unwrap();

        let provider = Provider::select_from(&[Algorithm::SizeOnly]);
        assert!(verify_trees(&source, &snapshot, &defaults(), &provider).is_ok());

        // And fails when mtimes drift
        let later = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_times(snapshot.join("a.txt"), later, later).unwrap();
        let err = verify_trees(&source, &snapshot, &defaults(), &provider).unwrap_err();
        assert!(err.message().contains("mtime differs"));
    }
}
