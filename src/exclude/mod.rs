//! Exclusion matching for snapshot and restore traversals
//!
//! Patterns are rsync-style globs. A trailing `/` restricts a pattern to
//! directories. Matching is attempted against the path relative to the
//! tree root and against the entry name, so `*.log` excludes logs at any
//! depth and `temp/` excludes any directory called `temp`.
//!
//! The default set is unconditional and always precedes user patterns.
//! When the backup root is nested under the source it is added as a
//! literal directory pattern, so the engine can never copy its own output
//! into itself.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Patterns excluded from every snapshot
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".gudang/",
    "temp/",
    ".temp/",
    "tmp/",
    "*~",
    "~*",
    ".tmp.*",
    ".checkpoint.lock",
];

/// Compiled exclusion decision for one snapshot operation
#[derive(Debug)]
pub struct ExclusionSet {
    all: GlobSet,
    dir_only: GlobSet,
}

impl ExclusionSet {
    /// Compile defaults ∪ user patterns ∪ the backup root (when nested).
    ///
    /// `backup_root_rel` is the backup root expressed relative to the
    /// source; an absolute path here means the root is not nested and is
    /// ignored.
    pub fn build(
        user_patterns: &[String],
        backup_root_rel: Option<&Path>,
    ) -> Result<Self, globset::Error> {
        let mut all = GlobSetBuilder::new();
        let mut dir_only = GlobSetBuilder::new();

        for pattern in DEFAULT_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .chain(user_patterns.iter().cloned())
        {
            match pattern.strip_suffix('/') {
                Some(dir_pattern) if !dir_pattern.is_empty() => {
                    dir_only.add(Glob::new(dir_pattern)?);
                }
                _ => {
                    all.add(Glob::new(&pattern)?);
                }
            }
        }

        if let Some(rel) = backup_root_rel {
            if rel.is_relative() && !rel.as_os_str().is_empty() {
                // Literal match only; the root path is not a glob
                dir_only.add(Glob::new(&globset::escape(&rel.to_string_lossy()))?);
            }
        }

        Ok(Self {
            all: all.build()?,
            dir_only: dir_only.build()?,
        })
    }

    /// Build with defaults only.
    pub fn defaults() -> Result<Self, globset::Error> {
        Self::build(&[], None)
    }

    /// Decide whether the entry at `rel` (relative to the tree root) is
    /// excluded.
    pub fn is_excluded(&self, rel: &Path, is_dir: bool) -> bool {
        if self.matches(&self.all, rel) {
            return true;
        }
        if is_dir && self.matches(&self.dir_only, rel) {
            return true;
        }
        false
    }

    fn matches(&self, set: &GlobSet, rel: &Path) -> bool {
        if set.is_match(rel) {
            return true;
        }
        match rel.file_name() {
            Some(name) => set.is_match(Path::new(name)),
            None => false,
        }
    }
}

/// Optional pattern restriction for comparison and restore traversals.
///
/// An empty pattern list matches everything.
#[derive(Debug)]
pub struct PatternFilter {
    set: Option<GlobSet>,
}

impl PatternFilter {
    /// Compile a (possibly empty) pattern list.
    pub fn build(patterns: &[String]) -> Result<Self, globset::Error> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            set: Some(builder.build()?),
        })
    }

    /// Whether the entry at `rel` passes the restriction.
    pub fn matches(&self, rel: &Path) -> bool {
        match &self.set {
            None => true,
            Some(set) => {
                if set.is_match(rel) {
                    return true;
                }
                match rel.file_name() {
                    Some(name) => set.is_match(Path::new(name)),
                    None => false,
                }
            }
        }
    }

    /// Whether any restriction is in effect.
    pub fn is_restricted(&self) -> bool {
        self.set.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_patterns_exclude() {
        let set = ExclusionSet::defaults().unwrap();

        assert!(set.is_excluded(Path::new("tmp"), true));
        assert!(set.is_excluded(Path::new("sub/temp"), true));
        assert!(set.is_excluded(Path::new("notes.txt~"), false));
        assert!(set.is_excluded(Path::new("~lockfile"), false));
        assert!(set.is_excluded(Path::new(".tmp.abc123"), true));
        assert!(set.is_excluded(Path::new(".checkpoint.lock"), true));
    }

    #[test]
    fn test_default_patterns_keep_normal_files() {
        let set = ExclusionSet::defaults().unwrap();

        assert!(!set.is_excluded(Path::new("a.txt"), false));
        assert!(!set.is_excluded(Path::new("sub/b.txt"), false));
        assert!(!set.is_excluded(Path::new("template"), false));
    }

    #[test]
    fn test_dir_only_pattern_spares_files() {
        let set = ExclusionSet::build(&["node_modules/".to_string()], None).unwrap();

        assert!(set.is_excluded(Path::new("node_modules"), true));
        assert!(set.is_excluded(Path::new("pkg/node_modules"), true));
        // A file with the same name is not a directory match
        assert!(!set.is_excluded(Path::new("node_modules"), false));
    }

    #[test]
    fn test_user_glob_pattern() {
        let set = ExclusionSet::build(&["*.log".to_string()], None).unwrap();

        assert!(set.is_excluded(Path::new("app.log"), false));
        assert!(set.is_excluded(Path::new("deep/nested/app.log"), false));
        assert!(!set.is_excluded(Path::new("app.txt"), false));
    }

    #[test]
    fn test_nested_backup_root_always_excluded() {
        let rel = PathBuf::from("backups/myproj");
        let set = ExclusionSet::build(&[], Some(&rel)).unwrap();

        assert!(set.is_excluded(Path::new("backups/myproj"), true));
        assert!(!set.is_excluded(Path::new("backups/other"), true));
    }

    #[test]
    fn test_non_nested_backup_root_ignored() {
        // relative_to() returns the original absolute path when the root
        // is outside the source; that must not exclude anything
        let abs = PathBuf::from("/var/backups/myproj");
        let set = ExclusionSet::build(&[], Some(&abs)).unwrap();

        assert!(!set.is_excluded(Path::new("var"), true));
        assert!(!set.is_excluded(Path::new("myproj"), true));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = PatternFilter::build(&[]).unwrap();

        assert!(!filter.is_restricted());
        assert!(filter.matches(Path::new("anything/at/all")));
    }

    #[test]
    fn test_filter_restricts() {
        let filter = PatternFilter::build(&["*.txt".to_string()]).unwrap();

        assert!(filter.is_restricted());
        assert!(filter.matches(Path::new("a.txt")));
        assert!(filter.matches(Path::new("sub/b.txt")));
        assert!(!filter.matches(Path::new("app.log")));
    }
}
