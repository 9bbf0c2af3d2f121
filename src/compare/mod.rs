//! Comparison engine
//!
//! Two modes over the same classifier:
//!
//! - live-vs-snapshot: entries reachable under the snapshot classify as
//!   Identical / Differs / OnlyInSnapshot; live entries absent from the
//!   snapshot classify as OnlyInLive.
//! - snapshot-vs-snapshot: the same, labelled OnlyInFirst / OnlyInSecond.
//!
//! A pattern list restricts the traversal to matching relative paths.
//! Binary files count as Differs without a diff body; broken symlinks
//! compare by target string; entries that cannot be read classify as
//! Inaccessible and are recorded in the error list. Per-file errors never
//! abort the scan; a non-empty error list makes the result partial.

pub mod render;
pub mod report;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::exclude::PatternFilter;
use crate::metadata::METADATA_FILE;
use crate::observability::Logger;

pub use render::{DiffRenderer, DIFF_TOOL_PREFERENCE};
pub use report::{ComparisonReport, ComparisonStatus, DiffClass, FileDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Symlink,
}

/// The comparison engine, bound to a logger and a diff strategy
pub struct CompareEngine<'a> {
    logger: &'a Logger,
    renderer: DiffRenderer,
}

impl<'a> CompareEngine<'a> {
    /// Engine with the auto-detected diff strategy
    pub fn new(logger: &'a Logger) -> Self {
        Self {
            logger,
            renderer: DiffRenderer::detect(),
        }
    }

    /// Engine with an explicit diff strategy
    pub fn with_renderer(logger: &'a Logger, renderer: DiffRenderer) -> Self {
        Self { logger, renderer }
    }

    /// Compare a snapshot against a live directory.
    pub fn compare_with_live(
        &self,
        snapshot: &Path,
        live: &Path,
        patterns: &[String],
        detailed: bool,
    ) -> io::Result<ComparisonReport> {
        self.compare_trees(
            snapshot,
            live,
            true,
            false,
            patterns,
            detailed,
            ("only in snapshot", "only in live"),
        )
    }

    /// Compare two snapshots. Symmetrical.
    pub fn compare_snapshots(
        &self,
        first: &Path,
        second: &Path,
        patterns: &[String],
        detailed: bool,
    ) -> io::Result<ComparisonReport> {
        self.compare_trees(
            first,
            second,
            true,
            true,
            patterns,
            detailed,
            ("only in first", "only in second"),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn compare_trees(
        &self,
        left: &Path,
        right: &Path,
        skip_metadata_left: bool,
        skip_metadata_right: bool,
        patterns: &[String],
        detailed: bool,
        (only_left, only_right): (&str, &str),
    ) -> io::Result<ComparisonReport> {
        if !left.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("comparison side does not exist: {}", left.display()),
            ));
        }

        let filter = PatternFilter::build(patterns)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut report = ComparisonReport::new(
            left.display().to_string(),
            right.display().to_string(),
            only_left,
            only_right,
        );

        let left_entries =
            collect_entries(left, skip_metadata_left, &filter, &mut report.errors);
        let right_entries =
            collect_entries(right, skip_metadata_right, &filter, &mut report.errors);

        for (rel, left_kind) in &left_entries {
            match right_entries.get(rel) {
                None => report.push(rel.clone(), DiffClass::OnlyInLeft, None),
                Some(right_kind) => {
                    self.classify_pair(
                        rel,
                        left.join(rel),
                        right.join(rel),
                        *left_kind,
                        *right_kind,
                        detailed,
                        &mut report,
                    );
                }
            }
        }

        for rel in right_entries.keys() {
            if !left_entries.contains_key(rel) {
                report.push(rel.clone(), DiffClass::OnlyInRight, None);
            }
        }

        self.logger.info(
            "COMPARE_DONE",
            &[
                ("differs", &report.count(DiffClass::Differs).to_string()),
                ("entries", &report.entries.len().to_string()),
                ("errors", &report.errors.len().to_string()),
            ],
        );

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_pair(
        &self,
        rel: &Path,
        left_path: PathBuf,
        right_path: PathBuf,
        left_kind: EntryKind,
        right_kind: EntryKind,
        detailed: bool,
        report: &mut ComparisonReport,
    ) {
        if left_kind != right_kind {
            // A file on one side and a symlink on the other can never be
            // identical; no textual diff applies
            report.push(rel.to_path_buf(), DiffClass::Differs, None);
            return;
        }

        match left_kind {
            EntryKind::Symlink => {
                // Broken symlinks compare by target string like any other
                let left_target = fs::read_link(&left_path);
                let right_target = fs::read_link(&right_path);
                match (left_target, right_target) {
                    (Ok(a), Ok(b)) if a == b => {
                        report.push(rel.to_path_buf(), DiffClass::Identical, None)
                    }
                    (Ok(_), Ok(_)) => {
                        report.push(rel.to_path_buf(), DiffClass::Differs, None)
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        report.push_error(format!("{}: {}", rel.display(), e));
                        report.push(rel.to_path_buf(), DiffClass::Inaccessible, None);
                    }
                }
            }
            EntryKind::File => match files_equal(&left_path, &right_path) {
                Ok(true) => report.push(rel.to_path_buf(), DiffClass::Identical, None),
                Ok(false) => {
                    let diff = if detailed
                        && !is_binary(&left_path)
                        && !is_binary(&right_path)
                    {
                        Some(self.renderer.render(
                            &left_path,
                            &right_path,
                            &left_path.display().to_string(),
                            &right_path.display().to_string(),
                        ))
                    } else {
                        None
                    };
                    report.push(rel.to_path_buf(), DiffClass::Differs, diff);
                }
                Err(e) => {
                    report.push_error(format!("{}: {}", rel.display(), e));
                    report.push(rel.to_path_buf(), DiffClass::Inaccessible, None);
                }
            },
        }
    }
}

/// Collect files and symlinks under `root` as relative paths, applying
/// the pattern restriction. Traversal errors are recorded, never raised.
fn collect_entries(
    root: &Path,
    skip_metadata: bool,
    filter: &PatternFilter,
    errors: &mut Vec<String>,
) -> BTreeMap<PathBuf, EntryKind> {
    let mut entries = BTreeMap::new();
    if !root.exists() {
        return entries;
    }

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        if skip_metadata && rel == Path::new(METADATA_FILE) {
            continue;
        }
        if !filter.matches(&rel) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            entries.insert(rel, EntryKind::Symlink);
        } else if file_type.is_file() {
            entries.insert(rel, EntryKind::File);
        }
    }

    entries
}

/// Byte-wise equality, size short-circuit first.
fn files_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let n_a = reader_a.read(&mut buf_a)?;
        let n_b = reader_b.read(&mut buf_b)?;
        if n_a != n_b {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
        if buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
    }
}

/// A NUL byte in the first 8KB marks a file as binary.
fn is_binary(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return true;
    };
    let mut buffer = [0u8; 8192];
    let mut reader = BufReader::new(file);
    match reader.read(&mut buffer) {
        Ok(n) => buffer[..n].contains(&0),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{Logger, Severity};
    use tempfile::TempDir;

    fn quiet_logger() -> Logger {
        Logger::new(Severity::Fatal)
    }

    fn setup_trees(temp_dir: &TempDir) -> (PathBuf, PathBuf) {
        let snap = temp_dir.path().join("snap");
        let live = temp_dir.path().join("live");
        fs::create_dir(&snap).unwrap();
        fs::create_dir(&live).unwrap();

        fs::write(snap.join("same.txt"), b"unchanged\n").unwrap();
        fs::write(live.join("same.txt"), b"unchanged\n").unwrap();

        fs::write(snap.join("changed.txt"), b"old content\n").unwrap();
        fs::write(live.join("changed.txt"), b"new content\n").unwrap();

        fs::write(snap.join("deleted.txt"), b"was here\n").unwrap();
        fs::write(live.join("added.txt"), b"is new\n").unwrap();

        (snap, live)
    }

    #[test]
    fn test_classification() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], false)
            .unwrap();

        assert_eq!(report.count(DiffClass::Identical), 1);
        assert_eq!(report.count(DiffClass::Differs), 1);
        assert_eq!(report.count(DiffClass::OnlyInLeft), 1);
        assert_eq!(report.count(DiffClass::OnlyInRight), 1);
        assert_eq!(report.status(), ComparisonStatus::Complete);
    }

    #[test]
    fn test_detailed_adds_diff_body() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], true)
            .unwrap();

        let changed = report
            .entries
            .iter()
            .find(|e| e.path == Path::new("changed.txt"))
            .unwrap();
        let diff = changed.diff.as_ref().unwrap();
        assert!(diff.contains("-old content"));
        assert!(diff.contains("+new content"));
    }

    #[test]
    fn test_binary_differs_without_body() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        fs::write(snap.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        fs::write(live.join("blob.bin"), [0u8, 9, 9, 9]).unwrap();
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], true)
            .unwrap();

        let blob = report
            .entries
            .iter()
            .find(|e| e.path == Path::new("blob.bin"))
            .unwrap();
        assert_eq!(blob.class, DiffClass::Differs);
        assert!(blob.diff.is_none());
    }

    #[test]
    fn test_pattern_restriction() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &["changed.txt".to_string()], false)
            .unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.count(DiffClass::Differs), 1);
    }

    #[test]
    fn test_metadata_record_not_compared() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        fs::write(snap.join(METADATA_FILE), b"SOURCE=/x\n").unwrap();
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], false)
            .unwrap();

        assert!(report
            .entries
            .iter()
            .all(|e| e.path != Path::new(METADATA_FILE)));
    }

    #[test]
    fn test_symlinks_compare_by_target() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        // Broken on both sides; still classifiable by target string
        std::os::unix::fs::symlink("/nowhere/a", snap.join("dangling")).unwrap();
        std::os::unix::fs::symlink("/nowhere/a", live.join("dangling")).unwrap();
        std::os::unix::fs::symlink("x", snap.join("moved")).unwrap();
        std::os::unix::fs::symlink("y", live.join("moved")).unwrap();
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], false)
            .unwrap();

        let dangling = report
            .entries
            .iter()
            .find(|e| e.path == Path::new("dangling"))
            .unwrap();
        assert_eq!(dangling.class, DiffClass::Identical);

        let moved = report
            .entries
            .iter()
            .find(|e| e.path == Path::new("moved"))
            .unwrap();
        assert_eq!(moved.class, DiffClass::Differs);
    }

    #[test]
    fn test_type_mismatch_differs() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, live) = setup_trees(&temp_dir);
        fs::write(snap.join("entry"), b"a file").unwrap();
        std::os::unix::fs::symlink("same.txt", live.join("entry")).unwrap();
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &live, &[], false)
            .unwrap();

        let entry = report
            .entries
            .iter()
            .find(|e| e.path == Path::new("entry"))
            .unwrap();
        assert_eq!(entry.class, DiffClass::Differs);
    }

    #[test]
    fn test_missing_live_dir_all_only_in_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let (snap, _) = setup_trees(&temp_dir);
        let logger = quiet_logger();

        let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(&snap, &temp_dir.path().join("absent"), &[], false)
            .unwrap();

        assert_eq!(report.count(DiffClass::OnlyInLeft), 3);
        assert_eq!(report.count(DiffClass::OnlyInRight), 0);
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let logger = quiet_logger();

        let result = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
            .compare_with_live(
                &temp_dir.path().join("absent"),
                temp_dir.path(),
                &[],
                false,
            );

        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_vs_snapshot_symmetry() {
        let temp_dir = TempDir::new().unwrap();
        let (first, second) = setup_trees(&temp_dir);
        let logger = quiet_logger();

        let engine = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin);
        let forward = engine.compare_snapshots(&first, &second, &[], false).unwrap();
        let backward = engine.compare_snapshots(&second, &first, &[], false).unwrap();

        assert_eq!(
            forward.count(DiffClass::OnlyInLeft),
            backward.count(DiffClass::OnlyInRight)
        );
        assert_eq!(
            forward.count(DiffClass::Differs),
            backward.count(DiffClass::Differs)
        );
        assert_eq!(
            forward.count(DiffClass::Identical),
            backward.count(DiffClass::Identical)
        );
    }
}
