//! Comparison engine report tests
//!
//! - Snapshot-vs-live classification over a real snapshot
//! - Snapshot-vs-snapshot classification across two generations
//! - Pattern restriction and detailed diff bodies

use std::fs;
use std::path::Path;

use checkpoint::compare::{CompareEngine, ComparisonStatus, DiffClass, DiffRenderer};
use checkpoint::observability::{Logger, Severity};
use checkpoint::snapshot::{CreateOptions, SnapshotEngine};
use tempfile::TempDir;

fn quiet_logger() -> Logger {
    Logger::new(Severity::Fatal)
}

#[test]
fn test_live_drift_classified() {
    let temp_dir = TempDir::new().unwrap();
    let logger = quiet_logger();

    let source = temp_dir.path().join("src");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("same.txt"), b"stable\n").unwrap();
    fs::write(source.join("changed.txt"), b"version one\n").unwrap();
    fs::write(source.join("deleted.txt"), b"soon gone\n").unwrap();

    let root = temp_dir.path().join("bak");
    let name = SnapshotEngine::new(&logger)
        .create(&source, &root, &CreateOptions::default())
        .unwrap();
    let snapshot = root.join(&name);

    // Drift the live tree
    fs::write(source.join("changed.txt"), b"version two\n").unwrap();
    fs::remove_file(source.join("deleted.txt")).unwrap();
    fs::write(source.join("added.txt"), b"brand new\n").unwrap();

    let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
        .compare_with_live(&snapshot, &source, &[], false)
        .unwrap();

    assert_eq!(report.count(DiffClass::Identical), 1);
    assert_eq!(report.count(DiffClass::Differs), 1);
    assert_eq!(report.count(DiffClass::OnlyInLeft), 1); // deleted.txt
    assert_eq!(report.count(DiffClass::OnlyInRight), 1); // added.txt
    assert_eq!(report.status(), ComparisonStatus::Complete);
}

#[test]
fn test_snapshot_vs_snapshot_between_generations() {
    let temp_dir = TempDir::new().unwrap();
    let logger = quiet_logger();
    let engine = SnapshotEngine::new(&logger);

    let source = temp_dir.path().join("src");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("keep.txt"), b"constant\n").unwrap();
    fs::write(source.join("evolve.txt"), b"generation one\n").unwrap();

    let root = temp_dir.path().join("bak");
    let first = engine
        .create(&source, &root, &CreateOptions::default())
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(1100));
    fs::write(source.join("evolve.txt"), b"generation two\n").unwrap();
    fs::write(source.join("late.txt"), b"added later\n").unwrap();
    let second = engine
        .create(&source, &root, &CreateOptions::default())
        .unwrap();

    let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
        .compare_snapshots(&root.join(&first), &root.join(&second), &[], false)
        .unwrap();

    assert_eq!(report.count(DiffClass::Identical), 1);
    assert_eq!(report.count(DiffClass::Differs), 1);
    assert_eq!(report.count(DiffClass::OnlyInRight), 1); // late.txt
    assert_eq!(report.count(DiffClass::OnlyInLeft), 0);
}

#[test]
fn test_detailed_diff_shows_changed_lines() {
    let temp_dir = TempDir::new().unwrap();
    let logger = quiet_logger();

    let source = temp_dir.path().join("src");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("notes.txt"), b"first line\nsecond line\n").unwrap();

    let root = temp_dir.path().join("bak");
    let name = SnapshotEngine::new(&logger)
        .create(&source, &root, &CreateOptions::default())
        .unwrap();

    fs::write(source.join("notes.txt"), b"first line\nrewritten line\n").unwrap();

    let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
        .compare_with_live(&root.join(&name), &source, &[], true)
        .unwrap();

    let entry = report
        .entries
        .iter()
        .find(|e| e.path == Path::new("notes.txt"))
        .unwrap();
    let diff = entry.diff.as_ref().expect("detailed mode carries a diff");
    assert!(diff.contains("-second line"));
    assert!(diff.contains("+rewritten line"));
}

#[test]
fn test_pattern_restriction_limits_scan() {
    let temp_dir = TempDir::new().unwrap();
    let logger = quiet_logger();

    let source = temp_dir.path().join("src");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("code.rs"), b"fn main() {}\n").unwrap();
    fs::write(source.join("data.csv"), b"a,b\n").unwrap();

    let root = temp_dir.path().join("bak");
    let name = SnapshotEngine::new(&logger)
        .create(&source, &root, &CreateOptions::default())
        .unwrap();

    fs::write(source.join("code.rs"), b"fn main() { changed() }\n").unwrap();
    fs::write(source.join("data.csv"), b"a,b,c\n").unwrap();

    let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
        .compare_with_live(&root.join(&name), &source, &["*.rs".to_string()], false)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].path, Path::new("code.rs"));
}

#[test]
fn test_rendered_report_is_readable() {
    let temp_dir = TempDir::new().unwrap();
    let logger = quiet_logger();

    let source = temp_dir.path().join("src");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("a.txt"), b"x\n").unwrap();

    let root = temp_dir.path().join("bak");
    let name = SnapshotEngine::new(&logger)
        .create(&source, &root, &CreateOptions::default())
        .unwrap();

    fs::remove_file(source.join("a.txt")).unwrap();

    let report = CompareEngine::with_renderer(&logger, DiffRenderer::Builtin)
        .compare_with_live(&root.join(&name), &source, &[], false)
        .unwrap();
    let rendered = report.to_string();

    assert!(rendered.contains("only in snapshot"));
    assert!(rendered.contains("a.txt"));
}
