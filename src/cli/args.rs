//! CLI argument definitions using clap
//!
//! The surface is flag-selected: the default verb creates a checkpoint,
//! and `--list`, `--restore`, `--compare-with`, `--metadata`,
//! `--prune-only`, `--force-unlock`, and `--remote` select the others.

use clap::Parser;
use std::path::PathBuf;

/// checkpoint - timestamped, verifiable directory snapshots
#[derive(Parser, Debug)]
#[command(name = "checkpoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source directory (defaults to the current directory)
    pub source: Option<PathBuf>,

    /// Backup root; overrides the computed default
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Checkpoint name suffix
    #[arg(long, value_name = "SUFFIX")]
    pub suffix: Option<String>,

    /// Description stored in the checkpoint metadata
    #[arg(long, value_name = "TEXT")]
    pub describe: Option<String>,

    /// User tag (KEY=VALUE); repeatable
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,

    /// Exclusion pattern; repeatable
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Verify after creation, or verify --checkpoint standalone
    #[arg(long)]
    pub verify: bool,

    /// Disable hardlink deduplication against the prior checkpoint
    #[arg(long)]
    pub no_hardlink: bool,

    /// Keep only the N most recent checkpoints
    #[arg(long, value_name = "N")]
    pub keep: Option<String>,

    /// Delete checkpoints older than DAYS
    #[arg(long, value_name = "DAYS")]
    pub age: Option<String>,

    /// Apply retention only; nothing is created
    #[arg(long)]
    pub prune_only: bool,

    /// List checkpoints in the backup root
    #[arg(long)]
    pub list: bool,

    /// Restore a checkpoint (the latest when no id is given)
    #[arg(long, value_name = "CHECKPOINT", num_args = 0..=1, default_missing_value = "")]
    pub restore: Option<String>,

    /// Restore target directory (defaults to the recorded SOURCE)
    #[arg(long, value_name = "DIR")]
    pub restore_to: Option<PathBuf>,

    /// Restrict restore or comparison to matching paths; repeatable
    #[arg(long = "files", value_name = "PATTERN")]
    pub files: Vec<String>,

    /// Enumerate restore actions without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Show diffs: before a restore, or detailed comparison output
    #[arg(long)]
    pub diff: bool,

    /// Delete target entries absent from the checkpoint during restore
    #[arg(long)]
    pub full_replace: bool,

    /// Compare a checkpoint with the live tree, or two checkpoints
    #[arg(long = "compare-with", value_name = "CHECKPOINT", num_args = 1..=2)]
    pub compare_with: Vec<String>,

    /// Metadata verbs; combine with --show, --update, or --find
    #[arg(long)]
    pub metadata: bool,

    /// Show a checkpoint's metadata record
    #[arg(long)]
    pub show: bool,

    /// Update one metadata key (KEY=VALUE)
    #[arg(long, value_name = "KEY=VALUE")]
    pub update: Option<String>,

    /// Find checkpoints whose record contains KEY=VALUE
    #[arg(long, value_name = "KEY=VALUE")]
    pub find: Option<String>,

    /// Checkpoint id for metadata verbs and standalone verification
    #[arg(long, value_name = "CHECKPOINT")]
    pub checkpoint: Option<String>,

    /// Remote target (user@host:path); wraps the chosen verb
    #[arg(long, value_name = "USER@HOST:PATH")]
    pub remote: Option<String>,

    /// Identity file for the remote transport
    #[arg(long, value_name = "FILE")]
    pub ssh_key: Option<PathBuf>,

    /// Remote connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<String>,

    /// Seconds to wait for the backup-root lock
    #[arg(long, value_name = "SECS")]
    pub lock_timeout: Option<String>,

    /// Remove the backup root's lock unconditionally and exit
    #[arg(long)]
    pub force_unlock: bool,

    /// Remove an existing lock before acquiring
    #[arg(long)]
    pub force: bool,

    /// Answer yes to every prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Warnings and errors only
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Trace-level detail
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation() {
        let cli = Cli::parse_from(["checkpoint", "/home/user/project"]);

        assert_eq!(cli.source, Some(PathBuf::from("/home/user/project")));
        assert!(!cli.list);
        assert!(cli.restore.is_none());
        assert!(!cli.no_hardlink);
    }

    #[test]
    fn test_restore_without_id() {
        let cli = Cli::parse_from(["checkpoint", "--restore"]);
        assert_eq!(cli.restore, Some(String::new()));
    }

    #[test]
    fn test_restore_with_id() {
        let cli = Cli::parse_from(["checkpoint", "--restore", "20250430_091429"]);
        assert_eq!(cli.restore, Some("20250430_091429".to_string()));
    }

    #[test]
    fn test_compare_with_accepts_one_or_two() {
        let one = Cli::parse_from(["checkpoint", "--compare-with", "20250430_091429"]);
        assert_eq!(one.compare_with.len(), 1);

        let two = Cli::parse_from([
            "checkpoint",
            "--compare-with",
            "20250430_091429",
            "20250501_101530",
        ]);
        assert_eq!(two.compare_with.len(), 2);
    }

    #[test]
    fn test_repeatable_flags() {
        let cli = Cli::parse_from([
            "checkpoint",
            "--tag",
            "release=v1",
            "--tag",
            "owner=ops",
            "--exclude",
            "*.log",
            "--files",
            "*.txt",
        ]);

        assert_eq!(cli.tags.len(), 2);
        assert_eq!(cli.exclude, vec!["*.log"]);
        assert_eq!(cli.files, vec!["*.txt"]);
    }

    #[test]
    fn test_timeouts_arrive_as_strings() {
        // Validation happens in the command layer so bad values map to
        // the invalid-option exit code instead of clap's
        let cli = Cli::parse_from(["checkpoint", "--lock-timeout", "abc"]);
        assert_eq!(cli.lock_timeout, Some("abc".to_string()));
    }
}
