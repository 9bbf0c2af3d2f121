//! Per-snapshot metadata records
//!
//! Each snapshot carries one UTF-8 text file `.metadata` with a single
//! `KEY=VALUE` assignment per line. Reserved keys:
//!
//! - DESCRIPTION  free-form text
//! - CREATED      ISO-8601 UTC creation time
//! - HOST         machine that took the snapshot
//! - SYSTEM       operating system identifier
//! - USER         invoking user
//! - VERSION      engine version
//! - SOURCE       absolute path of the source tree
//!
//! Additional keys are user tags. All keys match [A-Za-z0-9_]+; at most
//! one assignment per key; update overwrites. Writes go to a sibling temp
//! file and are published by rename, so readers never see a torn record.

pub mod errors;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::snapshot;

pub use errors::{MetadataError, MetadataErrorCode, MetadataResult};

/// Record file name inside a snapshot
pub const METADATA_FILE: &str = ".metadata";

/// Reserved keys written by the snapshot engine
pub const RESERVED_KEYS: &[&str] = &[
    "DESCRIPTION",
    "CREATED",
    "HOST",
    "SYSTEM",
    "USER",
    "VERSION",
    "SOURCE",
];

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"))
}

/// Whether a key satisfies the [A-Za-z0-9_]+ rule
pub fn is_valid_key(key: &str) -> bool {
    key_regex().is_match(key)
}

/// Path of the record file inside a snapshot directory
pub fn metadata_path(snapshot_dir: &Path) -> PathBuf {
    snapshot_dir.join(METADATA_FILE)
}

/// An in-memory metadata record: ordered, unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    entries: Vec<(String, String)>,
}

impl MetadataRecord {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, overwriting any previous assignment.
    ///
    /// Newlines in the value would tear the line format and are folded to
    /// spaces.
    pub fn set(&mut self, key: &str, value: &str) -> MetadataResult<()> {
        if !is_valid_key(key) {
            return Err(MetadataError::invalid_key(key));
        }

        let value = value.replace(['\n', '\r'], " ");
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key.to_string(), value)),
        }
        Ok(())
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate entries in record order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of assignments
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no assignments
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the line format. Lines without `=` are skipped; a repeated
    /// key keeps the last assignment.
    pub fn parse(text: &str) -> Self {
        let mut record = Self::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if !is_valid_key(key) {
                continue;
            }
            // set() cannot fail for a validated key
            let _ = record.set(key, value);
        }
        record
    }

    /// Render the line format
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Write a record into a snapshot directory atomically: sibling temp file
/// first, then rename onto `.metadata`.
pub fn write(snapshot_dir: &Path, record: &MetadataRecord) -> MetadataResult<()> {
    let final_path = metadata_path(snapshot_dir);
    let temp_path = snapshot_dir.join(format!("{}.tmp", METADATA_FILE));

    fs::write(&temp_path, record.to_text()).map_err(|e| {
        MetadataError::io_error(
            format!("Failed to write metadata temp file {}", temp_path.display()),
            e,
        )
    })?;

    fs::rename(&temp_path, &final_path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        MetadataError::io_error(
            format!("Failed to publish metadata {}", final_path.display()),
            e,
        )
    })
}

/// Read the record of a snapshot directory
pub fn read(snapshot_dir: &Path) -> MetadataResult<MetadataRecord> {
    let path = metadata_path(snapshot_dir);
    if !path.exists() {
        return Err(MetadataError::missing(&path));
    }

    let text = fs::read_to_string(&path).map_err(|e| {
        MetadataError::io_error(format!("Failed to read metadata {}", path.display()), e)
    })?;

    Ok(MetadataRecord::parse(&text))
}

/// Formatted record for display: one `KEY = VALUE` line per entry,
/// keys left-aligned.
pub fn show(snapshot_dir: &Path) -> MetadataResult<String> {
    let record = read(snapshot_dir)?;

    let width = record
        .iter()
        .map(|(k, _)| k.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (key, value) in record.iter() {
        out.push_str(&format!("{:<width$} = {}\n", key, value, width = width));
    }
    Ok(out)
}

/// Replace or append one key in a snapshot's record, atomically.
pub fn update(snapshot_dir: &Path, key: &str, value: &str) -> MetadataResult<()> {
    if !is_valid_key(key) {
        return Err(MetadataError::invalid_key(key));
    }

    let mut record = read(snapshot_dir)?;
    record.set(key, value)?;
    write(snapshot_dir, &record)
}

/// Find snapshots under `root` whose record contains the exact `KEY=VALUE`
/// assignment. Snapshots without a record are silently skipped. Names are
/// returned in ascending order.
pub fn find(root: &Path, key: &str, value: &str) -> MetadataResult<Vec<String>> {
    if !is_valid_key(key) {
        return Err(MetadataError::invalid_key(key));
    }

    let names = snapshot::list_snapshots(root).map_err(|e| {
        MetadataError::io_error(format!("Failed to enumerate {}", root.display()), e)
    })?;

    let mut matches = Vec::new();
    for name in names {
        let record = match read(&root.join(&name)) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if record.get(key) == Some(value) {
            matches.push(name);
        }
    }
    Ok(matches)
}
