//! Core snapshot creation logic
//!
//! Creation must follow this exact sequence:
//!
//! 1. Canonicalise source and root; the source must be a directory
//! 2. Acquire the root lock; register cleanup
//! 3. Require free space >= source size × 1.1
//! 4. Compute the name from the local timestamp and sanitised suffix
//! 5. Select the latest prior snapshot as hardlink base
//! 6. Create the hidden stage `.tmp.<token>`
//! 7. Mirror the source into the stage (exclusions, archive semantics,
//!    hardlinks against the base for unchanged files)
//! 8. Write `.metadata` into the stage
//! 9. Verify stage against source when requested
//! 10. Publish by a single atomic rename; this is the commit point
//! 11. Apply retention when a bound is set
//! 12. Release the lock (cleanup runs on every path)
//!
//! Any failure removes the stage; no observer ever sees the final name
//! until the rename has happened.

use std::fs;
use std::io::{self, BufReader, Read};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use filetime::FileTime;
use uuid::Uuid;
use walkdir::WalkDir;

use super::errors::{SnapshotError, SnapshotResult};
use super::{latest_snapshot, sanitize_suffix, verifier, CreateOptions, STAGE_PREFIX};
use crate::checksum::Provider;
use crate::cleanup::CleanupStack;
use crate::exclude::ExclusionSet;
use crate::lock;
use crate::metadata::{self, MetadataRecord};
use crate::observability::Logger;
use crate::platform;
use crate::retention;

/// Counters for one mirror pass
#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorStats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
}

pub(super) fn create_impl(
    logger: &Logger,
    source: &Path,
    root: &Path,
    opts: &CreateOptions,
) -> SnapshotResult<String> {
    // Step 1: prepare
    let source = platform::canonicalize(source)
        .map_err(|e| SnapshotError::failed(format!("Source not usable: {}", e)))?;
    if !source.is_dir() {
        return Err(SnapshotError::failed(format!(
            "Source is not a directory: {}",
            source.display()
        )));
    }

    if !root.exists() {
        fs::create_dir_all(root).map_err(|e| {
            SnapshotError::io_error(
                format!("Failed to create backup root: {}", root.display()),
                e,
            )
        })?;
    }
    let root = platform::canonicalize(root)
        .map_err(|e| SnapshotError::failed(format!("Backup root not usable: {}", e)))?;

    // Step 2: guard. The handle releases on every exit path; the stage
    // removal is registered as soon as the stage exists.
    let lock_handle = lock::acquire(&root, opts.lock_timeout_secs, opts.force_lock, logger)
        .map_err(SnapshotError::lock)?;
    let mut cleanup = CleanupStack::new();

    let result = create_locked(logger, &source, &root, opts, &mut cleanup);

    // Teardown order on every path: lock first, then stages
    drop(lock_handle);
    cleanup.run();

    result
}

/// Everything that happens under the lock.
fn create_locked(
    logger: &Logger,
    source: &Path,
    root: &Path,
    opts: &CreateOptions,
    cleanup: &mut CleanupStack,
) -> SnapshotResult<String> {
    // Step 3: capacity
    let need_kb = platform::tree_size_kb(source)
        .map_err(|e| SnapshotError::failed(format!("Failed to measure source: {}", e)))?;
    let free_kb = platform::disk_free_kb(root)
        .map_err(|e| SnapshotError::failed(format!("Failed to probe free space: {}", e)))?;
    let required_kb = need_kb + need_kb / 10;
    if free_kb < required_kb {
        return Err(SnapshotError::insufficient_space(required_kb, free_kb));
    }

    // Step 4: name
    let stamp = platform::timestamp_now();
    let name = match &opts.suffix {
        None => stamp,
        Some(raw) => {
            let suffix = sanitize_suffix(raw);
            if suffix.is_empty() {
                return Err(SnapshotError::invalid_suffix(raw));
            }
            format!("{}_{}", stamp, suffix)
        }
    };

    // Step 5: hardlink base, most recent prior snapshot by name order
    let base: Option<PathBuf> = if opts.hardlink {
        latest_snapshot(root)
            .map_err(|e| SnapshotError::io_error("Failed to enumerate prior snapshots", e))?
            .map(|n| root.join(n))
    } else {
        None
    };

    // Step 6: stage
    let token = Uuid::new_v4().simple().to_string();
    let stage = root.join(format!("{}{}", STAGE_PREFIX, token));
    fs::create_dir(&stage).map_err(|e| {
        SnapshotError::stage_failed(format!("Failed to create stage: {}", stage.display()), e)
    })?;
    cleanup.register_tree_removal(&stage);

    logger.info(
        "SNAPSHOT_STAGED",
        &[("name", name.as_str()), ("stage", &stage.display().to_string())],
    );

    // Step 7: populate
    let root_rel = platform::relative_to(source, root);
    let exclusions = ExclusionSet::build(&opts.exclude, Some(&root_rel))
        .map_err(|e| SnapshotError::failed(format!("Invalid exclusion pattern: {}", e)))?;

    let stats = mirror_tree(source, &stage, &exclusions, base.as_deref()).map_err(|e| {
        SnapshotError::stage_failed(format!("Failed to populate stage: {}", stage.display()), e)
    })?;

    // Step 8: metadata
    let record = build_record(source, opts)?;
    metadata::write(&stage, &record)
        .map_err(|e| SnapshotError::failed(format!("Failed to write metadata: {}", e)))?;

    // Step 9: verify
    if opts.verify {
        let provider = Provider::select();
        verifier::verify_trees(source, &stage, &exclusions, &provider)?;
        logger.info("SNAPSHOT_VERIFY_OK", &[("name", name.as_str())]);
    }

    // Step 10: publish. The single rename is the commit point.
    let dest = root.join(&name);
    fs::rename(&stage, &dest).map_err(|e| {
        SnapshotError::publish_failed(
            format!(
                "Failed to publish {} as {}",
                stage.display(),
                dest.display()
            ),
            e,
        )
    })?;

    logger.info(
        "SNAPSHOT_PUBLISHED",
        &[
            ("dirs", &stats.dirs.to_string()),
            ("files", &stats.files.to_string()),
            ("hardlinks", &stats.hardlinks.to_string()),
            ("name", name.as_str()),
            ("symlinks", &stats.symlinks.to_string()),
        ],
    );

    // Step 11: retain
    if let Some(mode) = &opts.retention {
        retention::apply(root, mode, false, logger)
            .map_err(|e| SnapshotError::io_error("Retention failed after publish", e))?;
    }

    Ok(name)
}

/// Mirror `source` into `dest` with archive semantics: permissions,
/// ownership (best effort for non-root), timestamps, and symlinks
/// preserved. Unchanged files hardlink against `base` when it is set.
pub(crate) fn mirror_tree(
    source: &Path,
    dest: &Path,
    exclusions: &ExclusionSet,
    base: Option<&Path>,
) -> io::Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    // Directory mtimes change as children land; restore them afterwards,
    // children before parents
    let mut dir_times: Vec<(PathBuf, FileTime, FileTime)> = Vec::new();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let rel = match entry.path().strip_prefix(source) {
                Ok(rel) => rel,
                Err(_) => return true,
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            !exclusions.is_excluded(rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        let rel = match entry.path().strip_prefix(source) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        let target = dest.join(&rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            let meta = entry.metadata().map_err(walk_error)?;
            fs::set_permissions(&target, meta.permissions())?;
            preserve_owner(&meta, &target);
            dir_times.push((
                target,
                FileTime::from_last_access_time(&meta),
                FileTime::from_last_modification_time(&meta),
            ));
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(&link_target, &target)?;
            let meta = entry.path().symlink_metadata()?;
            preserve_symlink_owner(&meta, &target);
            let _ = filetime::set_symlink_file_times(
                &target,
                FileTime::from_last_access_time(&meta),
                FileTime::from_last_modification_time(&meta),
            );
            stats.symlinks += 1;
        } else if file_type.is_file() {
            let meta = entry.metadata().map_err(walk_error)?;
            if let Some(base_root) = base {
                let base_file = base_root.join(&rel);
                if is_dedup_candidate(entry.path(), &meta, &base_file)? {
                    fs::hard_link(&base_file, &target)?;
                    stats.hardlinks += 1;
                    stats.files += 1;
                    continue;
                }
            }
            copy_file(entry.path(), &meta, &target)?;
            stats.files += 1;
        }
        // Other file types (fifos, sockets) are not snapshot material
    }

    for (path, atime, mtime) in dir_times.iter().rev() {
        let _ = filetime::set_file_times(path, *atime, *mtime);
    }

    Ok(stats)
}

/// Copy one file preserving mode, ownership, and times.
fn copy_file(src: &Path, src_meta: &fs::Metadata, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    preserve_owner(src_meta, dst);
    filetime::set_file_times(
        dst,
        FileTime::from_last_access_time(src_meta),
        FileTime::from_last_modification_time(src_meta),
    )?;
    Ok(())
}

/// Ownership transfer succeeds only for root; everyone else keeps the
/// invoking owner, which is the expected archive behaviour.
fn preserve_owner(meta: &fs::Metadata, target: &Path) {
    let _ = std::os::unix::fs::chown(target, Some(meta.uid()), Some(meta.gid()));
}

fn preserve_symlink_owner(meta: &fs::Metadata, target: &Path) {
    let _ = std::os::unix::fs::lchown(target, Some(meta.uid()), Some(meta.gid()));
}

/// Hardlink identity test: same size AND same mtime AND same content.
/// The cheap checks short-circuit before any bytes are read.
fn is_dedup_candidate(
    src: &Path,
    src_meta: &fs::Metadata,
    base_file: &Path,
) -> io::Result<bool> {
    let base_meta = match base_file.symlink_metadata() {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    if !base_meta.is_file() {
        return Ok(false);
    }
    if base_meta.len() != src_meta.len() {
        return Ok(false);
    }
    if FileTime::from_last_modification_time(&base_meta)
        != FileTime::from_last_modification_time(src_meta)
    {
        return Ok(false);
    }
    files_content_equal(src, base_file)
}

/// Byte-wise comparison in 8KB chunks.
fn files_content_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let mut reader_a = BufReader::new(fs::File::open(a)?);
    let mut reader_b = BufReader::new(fs::File::open(b)?);
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

/// Assemble the stage's metadata record.
pub(crate) fn build_record(source: &Path, opts: &CreateOptions) -> SnapshotResult<MetadataRecord> {
    let mut record = MetadataRecord::new();
    let set = |record: &mut MetadataRecord, key: &str, value: &str| {
        record
            .set(key, value)
            .map_err(|e| SnapshotError::failed(format!("Metadata rejected: {}", e)))
    };

    set(
        &mut record,
        "DESCRIPTION",
        opts.description.as_deref().unwrap_or(""),
    )?;
    set(
        &mut record,
        "CREATED",
        &Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    )?;
    set(&mut record, "HOST", &platform::hostname())?;
    set(
        &mut record,
        "SYSTEM",
        &format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    )?;
    set(&mut record, "USER", &platform::current_user())?;
    set(&mut record, "VERSION", env!("CARGO_PKG_VERSION"))?;
    set(&mut record, "SOURCE", &source.display().to_string())?;

    for (key, value) in &opts.tags {
        set(&mut record, key, value)?;
    }

    Ok(record)
}

fn walk_error(e: walkdir::Error) -> io::Error {
    let message = e.to_string();
    e.into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message))
}
