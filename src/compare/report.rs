//! Structured comparison reports
//!
//! Every compared entry lands in exactly one class. Per-file errors never
//! abort a scan; they are collected here, and a non-empty error list
//! marks the whole comparison partial.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Classification of one compared entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffClass {
    /// Present on both sides with equal content
    Identical,
    /// Present on both sides with differing content or type
    Differs,
    /// Present only on the left side
    OnlyInLeft,
    /// Present only on the right side
    OnlyInRight,
    /// Could not be read on at least one side
    Inaccessible,
}

/// One classified entry
#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub class: DiffClass,
    /// Unified diff body for text files, when detail was requested
    pub diff: Option<String>,
}

/// Outcome of a whole comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonStatus {
    Complete,
    /// Per-file errors occurred; the classification is incomplete
    Partial,
}

/// A full comparison result, serialisable for downstream renderers
#[derive(Debug, Serialize)]
pub struct ComparisonReport {
    /// Human label of the left side (snapshot name or path)
    pub left_label: String,
    /// Human label of the right side
    pub right_label: String,
    /// Category heading for OnlyInLeft, e.g. "only in snapshot"
    pub only_left_label: String,
    /// Category heading for OnlyInRight, e.g. "only in live"
    pub only_right_label: String,
    pub entries: Vec<FileDiff>,
    pub errors: Vec<String>,
}

impl ComparisonReport {
    pub fn new(
        left_label: impl Into<String>,
        right_label: impl Into<String>,
        only_left_label: impl Into<String>,
        only_right_label: impl Into<String>,
    ) -> Self {
        Self {
            left_label: left_label.into(),
            right_label: right_label.into(),
            only_left_label: only_left_label.into(),
            only_right_label: only_right_label.into(),
            entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Record one classified entry
    pub fn push(&mut self, path: PathBuf, class: DiffClass, diff: Option<String>) {
        self.entries.push(FileDiff { path, class, diff });
    }

    /// Record a per-file error
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Entries in a class
    pub fn count(&self, class: DiffClass) -> usize {
        self.entries.iter().filter(|e| e.class == class).count()
    }

    /// Whether any side differs at all
    pub fn has_differences(&self) -> bool {
        self.entries.iter().any(|e| e.class != DiffClass::Identical)
    }

    pub fn status(&self) -> ComparisonStatus {
        if self.errors.is_empty() {
            ComparisonStatus::Complete
        } else {
            ComparisonStatus::Partial
        }
    }

    fn heading(&self, class: DiffClass) -> &str {
        match class {
            DiffClass::Identical => "identical",
            DiffClass::Differs => "differs",
            DiffClass::OnlyInLeft => &self.only_left_label,
            DiffClass::OnlyInRight => &self.only_right_label,
            DiffClass::Inaccessible => "inaccessible",
        }
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Comparing {} against {}", self.left_label, self.right_label)?;
        writeln!(
            f,
            "  identical: {}  differs: {}  {}: {}  {}: {}  inaccessible: {}",
            self.count(DiffClass::Identical),
            self.count(DiffClass::Differs),
            self.only_left_label,
            self.count(DiffClass::OnlyInLeft),
            self.only_right_label,
            self.count(DiffClass::OnlyInRight),
            self.count(DiffClass::Inaccessible),
        )?;

        for class in [
            DiffClass::Differs,
            DiffClass::OnlyInLeft,
            DiffClass::OnlyInRight,
            DiffClass::Inaccessible,
        ] {
            let mut in_class: Vec<_> =
                self.entries.iter().filter(|e| e.class == class).collect();
            if in_class.is_empty() {
                continue;
            }
            in_class.sort_by(|a, b| a.path.cmp(&b.path));

            writeln!(f)?;
            writeln!(f, "{}:", self.heading(class))?;
            for entry in in_class {
                writeln!(f, "  {}", entry.path.display())?;
                if let Some(diff) = &entry.diff {
                    for line in diff.lines() {
                        writeln!(f, "    {}", line)?;
                    }
                }
            }
        }

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "errors ({} entries could not be read):", self.errors.len())?;
            for error in &self.errors {
                writeln!(f, "  {}", error)?;
            }
        }

        Ok(())
    }
}
