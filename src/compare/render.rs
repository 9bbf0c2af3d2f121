//! Unified diff rendering
//!
//! The strategy is chosen once at startup: the richest external tool on
//! PATH wins, otherwise the built-in line-unified renderer runs. The
//! comparison engine depends on the capability, not the tool identity.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use similar::TextDiff;

/// External tools in preference order
pub const DIFF_TOOL_PREFERENCE: &[&str] = &["delta", "colordiff", "diff"];

/// A diff rendering strategy
#[derive(Debug, Clone)]
pub enum DiffRenderer {
    /// Delegate to an external tool
    External(PathBuf),
    /// Render a line-unified diff in-process
    Builtin,
}

impl DiffRenderer {
    /// Pick the first available external tool, or fall back to built-in.
    pub fn detect() -> Self {
        for tool in DIFF_TOOL_PREFERENCE {
            if let Ok(path) = which::which(tool) {
                return DiffRenderer::External(path);
            }
        }
        DiffRenderer::Builtin
    }

    /// Render a unified diff of two text files.
    ///
    /// A failing external tool falls back to the built-in renderer rather
    /// than losing the diff.
    pub fn render(
        &self,
        left: &Path,
        right: &Path,
        left_label: &str,
        right_label: &str,
    ) -> String {
        match self {
            DiffRenderer::External(tool) => {
                match Command::new(tool).arg("-u").arg(left).arg(right).output() {
                    // diff-family tools exit 1 when the files differ
                    Ok(output) if output.status.code().map_or(false, |c| c <= 1) => {
                        String::from_utf8_lossy(&output.stdout).into_owned()
                    }
                    _ => Self::builtin(left, right, left_label, right_label),
                }
            }
            DiffRenderer::Builtin => Self::builtin(left, right, left_label, right_label),
        }
    }

    fn builtin(left: &Path, right: &Path, left_label: &str, right_label: &str) -> String {
        let left_text = fs::read_to_string(left).unwrap_or_default();
        let right_text = fs::read_to_string(right).unwrap_or_default();

        TextDiff::from_lines(&left_text, &right_text)
            .unified_diff()
            .context_radius(3)
            .header(left_label, right_label)
            .to_string()
    }
}
