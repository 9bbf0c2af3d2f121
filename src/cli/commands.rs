//! CLI command implementations
//!
//! One verb per invocation, selected by flags. `run_command` resolves
//! configuration, picks the verb, and dispatches into the engines; it is
//! the only function main.rs should call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::args::Cli;
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{prompt_line, StdinConfirmer};
use crate::compare::{CompareEngine, ComparisonStatus};
use crate::config::Settings;
use crate::lock;
use crate::metadata;
use crate::observability::{Logger, Severity};
use crate::platform;
use crate::remote::{RemoteDispatcher, RemoteSpec};
use crate::restore::{Confirmation, Confirmer, RestoreEngine, RestoreOptions};
use crate::retention::{self, RetentionMode};
use crate::snapshot::{self, CreateOptions, SnapshotEngine};

/// Parse the process arguments and run the selected verb.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}

/// Run the verb selected by the parsed arguments.
pub fn run_command(cli: Cli) -> CliResult<()> {
    let settings = build_settings(&cli)?;
    let logger = settings.logger();
    let source = cli.source.clone().unwrap_or_else(|| PathBuf::from("."));

    if let Some(raw) = &cli.remote {
        return run_remote(&cli, &settings, &logger, raw, &source);
    }

    let root = resolve_root(&settings, &source)?;

    if cli.force_unlock {
        lock::force_release(&root)?;
        println!("Lock removed from {}", root.display());
        return Ok(());
    }
    if cli.list {
        return cmd_list(&root);
    }
    if !cli.compare_with.is_empty() {
        return cmd_compare(&cli, &logger, &root, &source);
    }
    if cli.metadata {
        return cmd_metadata(&cli, &root);
    }
    if let Some(selector) = &cli.restore {
        return cmd_restore(&cli, &settings, &logger, &root, selector);
    }
    if cli.prune_only {
        return cmd_prune(&cli, &settings, &logger, &root);
    }
    if cli.verify && cli.checkpoint.is_some() {
        return cmd_verify(&cli, &logger, &root, &source);
    }

    cmd_create(&cli, &settings, &logger, &root, &source)
}

/// Settings from the environment, overridden by flags. Numeric flag
/// values are validated here so failures map to the invalid-option exit
/// code.
fn build_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::from_env();

    settings.backup_dir = cli.backup_dir.clone();
    settings.ssh_key = cli.ssh_key.clone();
    if cli.yes {
        settings.auto_confirm = true;
    }
    settings.min_severity = if cli.verbose {
        Severity::Trace
    } else if cli.quiet {
        Severity::Warn
    } else {
        Severity::Info
    };
    if let Some(raw) = &cli.lock_timeout {
        settings.lock_timeout_secs = parse_secs(raw, "--lock-timeout")?;
    }
    if let Some(raw) = &cli.connect_timeout {
        settings.connect_timeout_secs = parse_secs(raw, "--connect-timeout")?;
    }

    Ok(settings)
}

fn parse_secs(raw: &str, flag: &str) -> CliResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CliError::invalid_value(format!(
            "{} must be a positive integer, got '{}'",
            flag, raw
        ))),
    }
}

/// Split a KEY=VALUE argument.
fn parse_assignment(raw: &str) -> CliResult<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::invalid_value(format!(
            "Expected KEY=VALUE, got '{}'",
            raw
        ))),
    }
}

fn parse_tag_list(raw: &[String]) -> CliResult<Vec<(String, String)>> {
    let mut tags = Vec::new();
    for assignment in raw {
        let (key, value) = parse_assignment(assignment)?;
        if !metadata::is_valid_key(&key) {
            return Err(CliError::invalid_value(format!(
                "Invalid tag key '{}': keys match [A-Za-z0-9_]+",
                key
            )));
        }
        tags.push((key, value));
    }
    Ok(tags)
}

/// Resolve --keep / --age into a retention bound.
fn retention_mode(cli: &Cli) -> CliResult<Option<RetentionMode>> {
    match (&cli.keep, &cli.age) {
        (Some(_), Some(_)) => Err(CliError::invalid_value(
            "--keep and --age are mutually exclusive",
        )),
        (Some(raw), None) => match raw.trim().parse::<usize>() {
            Ok(n) => Ok(Some(RetentionMode::KeepN(n))),
            Err(_) => Err(CliError::invalid_value(format!(
                "--keep must be a non-negative integer, got '{}'",
                raw
            ))),
        },
        (None, Some(raw)) => match raw.trim().parse::<u32>() {
            Ok(d) if d > 0 => Ok(Some(RetentionMode::MaxAgeDays(d))),
            _ => Err(CliError::invalid_value(format!(
                "--age must be a positive number of days, got '{}'",
                raw
            ))),
        },
        (None, None) => Ok(None),
    }
}

fn resolve_root(settings: &Settings, source: &Path) -> CliResult<PathBuf> {
    // Canonicalize when possible so the basename is the real one; a
    // not-yet-existing source still resolves for verbs that never touch it
    let canonical =
        platform::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    Ok(settings.resolve_backup_root(&canonical)?)
}

/// A checkpoint id from the command line: validated, and present under
/// the root.
fn resolve_checkpoint_dir(root: &Path, id: &str) -> CliResult<PathBuf> {
    if !snapshot::is_snapshot_name(id) {
        return Err(CliError::invalid_value(format!(
            "Invalid checkpoint id: '{}'",
            id
        )));
    }
    let dir = root.join(id);
    if !dir.is_dir() {
        return Err(CliError::runtime(format!(
            "No such checkpoint: {}",
            dir.display()
        )));
    }
    Ok(dir)
}

// ---- local verbs ----

fn cmd_create(
    cli: &Cli,
    settings: &Settings,
    logger: &Logger,
    root: &Path,
    source: &Path,
) -> CliResult<()> {
    if !root.exists() && !settings.auto_confirm {
        let confirmer = StdinConfirmer {
            auto_confirm: false,
            timeout_secs: settings.confirm_timeout_secs,
        };
        let prompt = format!(
            "Backup root {} does not exist. Create it? [y/N] ",
            root.display()
        );
        match confirmer.confirm(&prompt) {
            Confirmation::Yes => {}
            Confirmation::No => {
                return Err(CliError::runtime("Backup root creation declined"))
            }
            Confirmation::TimedOut => {
                return Err(CliError::runtime("Backup root prompt timed out"))
            }
        }
    }

    let options = CreateOptions {
        suffix: cli.suffix.clone(),
        description: cli.describe.clone(),
        tags: parse_tag_list(&cli.tags)?,
        exclude: cli.exclude.clone(),
        verify: cli.verify,
        hardlink: !cli.no_hardlink,
        retention: retention_mode(cli)?,
        lock_timeout_secs: settings.lock_timeout_secs,
        force_lock: cli.force,
    };

    let name = SnapshotEngine::new(logger).create(source, root, &options)?;
    println!("Created checkpoint {}", name);
    Ok(())
}

fn cmd_list(root: &Path) -> CliResult<()> {
    let names = snapshot::list_snapshots(root)?;
    if names.is_empty() {
        println!("No checkpoints in {}", root.display());
        return Ok(());
    }

    println!(
        "{:<36} {:<22} {:>10}  {}",
        "CHECKPOINT", "CREATED", "SIZE(KB)", "DESCRIPTION"
    );
    for name in names {
        let dir = root.join(&name);
        let record = metadata::read(&dir).ok();
        let created = record
            .as_ref()
            .and_then(|r| r.get("CREATED"))
            .unwrap_or("-")
            .to_string();
        let description = record
            .as_ref()
            .and_then(|r| r.get("DESCRIPTION"))
            .unwrap_or("")
            .to_string();
        let size = platform::tree_size_kb(&dir)
            .map(|kb| kb.to_string())
            .unwrap_or_else(|_| "-".to_string());

        println!("{:<36} {:<22} {:>10}  {}", name, created, size, description);
    }
    Ok(())
}

fn cmd_compare(cli: &Cli, logger: &Logger, root: &Path, source: &Path) -> CliResult<()> {
    let engine = CompareEngine::new(logger);
    let first = resolve_checkpoint_dir(root, &cli.compare_with[0])?;

    let report = if cli.compare_with.len() == 2 {
        let second = resolve_checkpoint_dir(root, &cli.compare_with[1])?;
        engine.compare_snapshots(&first, &second, &cli.files, cli.diff)?
    } else {
        engine.compare_with_live(&first, source, &cli.files, cli.diff)?
    };

    println!("{}", report);
    if report.status() == ComparisonStatus::Partial {
        return Err(CliError::runtime(format!(
            "Comparison completed with {} unreadable entries",
            report.errors.len()
        )));
    }
    Ok(())
}

fn cmd_metadata(cli: &Cli, root: &Path) -> CliResult<()> {
    if let Some(assignment) = &cli.find {
        let (key, value) = parse_assignment(assignment)?;
        for name in metadata::find(root, &key, &value)? {
            println!("{}", name);
        }
        return Ok(());
    }

    let name = match &cli.checkpoint {
        Some(id) => {
            resolve_checkpoint_dir(root, id)?;
            id.clone()
        }
        None => snapshot::latest_snapshot(root)?
            .ok_or_else(|| CliError::runtime(format!("No checkpoints in {}", root.display())))?,
    };
    let dir = root.join(&name);

    if let Some(assignment) = &cli.update {
        let (key, value) = parse_assignment(assignment)?;
        metadata::update(&dir, &key, &value)?;
        println!("Updated {} on {}", key, name);
        return Ok(());
    }

    print!("{}", metadata::show(&dir)?);
    Ok(())
}

fn cmd_restore(
    cli: &Cli,
    settings: &Settings,
    logger: &Logger,
    root: &Path,
    selector: &str,
) -> CliResult<()> {
    let name = if selector.is_empty() {
        select_checkpoint(root, settings)?
    } else {
        resolve_checkpoint_dir(root, selector)?;
        selector.to_string()
    };
    let dir = root.join(&name);

    let options = RestoreOptions {
        target: cli.restore_to.clone(),
        patterns: cli.files.clone(),
        dry_run: cli.dry_run,
        diff_first: cli.diff,
        full_replace: cli.full_replace,
    };
    let confirmer = StdinConfirmer {
        auto_confirm: settings.auto_confirm,
        timeout_secs: settings.confirm_timeout_secs,
    };

    let report = RestoreEngine::new(logger).restore(&dir, &options, &confirmer)?;

    if options.dry_run {
        for line in &report.planned {
            println!("{}", line);
        }
        println!("{} actions planned; nothing written", report.planned.len());
    } else {
        println!(
            "Restored {} entries to {}",
            report.restored.len(),
            report.target.display()
        );
        if !report.deleted.is_empty() {
            println!("Deleted {} surplus entries", report.deleted.len());
        }
    }

    if report.is_partial() {
        for (path, reason) in &report.failed {
            eprintln!("failed: {}: {}", path.display(), reason);
        }
        return Err(CliError::partial_restore(report.failed.len()));
    }
    Ok(())
}

/// Interactive checkpoint selection, bounded by the select timeout.
fn select_checkpoint(root: &Path, settings: &Settings) -> CliResult<String> {
    let names = snapshot::list_snapshots(root)?;
    let latest = names
        .last()
        .cloned()
        .ok_or_else(|| CliError::runtime(format!("No checkpoints in {}", root.display())))?;

    if settings.auto_confirm {
        return Ok(latest);
    }

    println!("Available checkpoints:");
    for (index, name) in names.iter().enumerate() {
        println!("  [{}] {}", index + 1, name);
    }
    let prompt = format!("Select checkpoint [1-{}] (default latest): ", names.len());
    match prompt_line(&prompt, Duration::from_secs(settings.select_timeout_secs)) {
        None => Err(CliError::runtime("Checkpoint selection timed out")),
        Some(answer) if answer.is_empty() => Ok(latest),
        Some(answer) => match answer.parse::<usize>() {
            Ok(i) if (1..=names.len()).contains(&i) => Ok(names[i - 1].clone()),
            _ => Err(CliError::invalid_value(format!(
                "Invalid selection: '{}'",
                answer
            ))),
        },
    }
}

fn cmd_prune(cli: &Cli, settings: &Settings, logger: &Logger, root: &Path) -> CliResult<()> {
    let mode = retention_mode(cli)?.ok_or_else(|| {
        CliError::invalid_value("--prune-only needs --keep or --age")
    })?;

    // Retention mutates the root; it runs under the same lock as creation
    let mut handle = lock::acquire(root, settings.lock_timeout_secs, cli.force, logger)?;
    let result = retention::apply(root, &mode, true, logger);
    handle.release()?;

    let deleted = result?;
    if deleted.is_empty() {
        println!("Nothing to prune");
    } else {
        for name in &deleted {
            println!("Pruned {}", name);
        }
    }
    Ok(())
}

fn cmd_verify(cli: &Cli, logger: &Logger, root: &Path, source: &Path) -> CliResult<()> {
    let id = cli.checkpoint.as_deref().unwrap_or_default();
    let dir = resolve_checkpoint_dir(root, id)?;

    SnapshotEngine::new(logger).verify(&dir, source)?;
    println!("Checkpoint {} verifies against {}", id, source.display());
    Ok(())
}

// ---- remote ----

fn run_remote(
    cli: &Cli,
    settings: &Settings,
    logger: &Logger,
    raw: &str,
    source: &Path,
) -> CliResult<()> {
    let spec = RemoteSpec::parse(raw)?;
    let dispatcher = RemoteDispatcher::new(
        spec,
        settings.ssh_key.clone(),
        settings.connect_timeout_secs,
        logger,
    );

    if cli.force_unlock {
        dispatcher.force_unlock()?;
        println!("Remote lock removed");
        return Ok(());
    }
    if cli.list {
        let names = dispatcher.list()?;
        if names.is_empty() {
            println!("No checkpoints on remote");
        }
        for name in names {
            println!("{}", name);
        }
        return Ok(());
    }
    if cli.metadata {
        return remote_metadata(cli, &dispatcher);
    }
    if let Some(selector) = &cli.restore {
        let id = if selector.is_empty() {
            dispatcher
                .list()?
                .pop()
                .ok_or_else(|| CliError::runtime("No checkpoints on remote"))?
        } else {
            selector.clone()
        };
        let target = cli
            .restore_to
            .clone()
            .unwrap_or_else(|| source.to_path_buf());
        dispatcher.restore(&id, &target, &cli.files)?;
        println!("Restored {} to {}", id, target.display());
        return Ok(());
    }
    if !cli.compare_with.is_empty() {
        let report = dispatcher.compare(&cli.compare_with[0], source, &cli.files)?;
        if report.trim().is_empty() {
            println!("No differences");
        } else {
            print!("{}", report);
        }
        return Ok(());
    }
    if cli.prune_only {
        let mode = retention_mode(cli)?.ok_or_else(|| {
            CliError::invalid_value("--prune-only needs --keep or --age")
        })?;
        let deleted = dispatcher.retain(&mode, true)?;
        if deleted.is_empty() {
            println!("Nothing to prune");
        }
        for name in deleted {
            println!("Pruned {}", name);
        }
        return Ok(());
    }
    if cli.verify && cli.checkpoint.is_some() {
        let id = cli.checkpoint.clone().unwrap_or_default();
        let mismatches = dispatcher.verify(&id, source)?;
        if mismatches.is_empty() {
            println!("Checkpoint {} verifies against {}", id, source.display());
            return Ok(());
        }
        for line in &mismatches {
            println!("{}", line);
        }
        return Err(CliError::new(
            CliErrorCode::VerifyMismatch,
            format!("{} entries differ", mismatches.len()),
        ));
    }

    // Default verb: remote create
    let options = CreateOptions {
        suffix: cli.suffix.clone(),
        description: cli.describe.clone(),
        tags: parse_tag_list(&cli.tags)?,
        exclude: cli.exclude.clone(),
        verify: cli.verify,
        hardlink: !cli.no_hardlink,
        retention: None,
        lock_timeout_secs: settings.lock_timeout_secs,
        force_lock: cli.force,
    };
    let name = dispatcher.create(source, &options)?;
    println!("Created remote checkpoint {}", name);

    if let Some(mode) = retention_mode(cli)? {
        dispatcher.retain(&mode, false)?;
    }
    Ok(())
}

fn remote_metadata(cli: &Cli, dispatcher: &RemoteDispatcher<'_>) -> CliResult<()> {
    if let Some(assignment) = &cli.find {
        let (key, value) = parse_assignment(assignment)?;
        for name in dispatcher.metadata_find(&key, &value)? {
            println!("{}", name);
        }
        return Ok(());
    }

    let id = cli
        .checkpoint
        .clone()
        .ok_or_else(|| CliError::invalid_value("--checkpoint is required for remote metadata"))?;

    if let Some(assignment) = &cli.update {
        let (key, value) = parse_assignment(assignment)?;
        dispatcher.metadata_update(&id, &key, &value)?;
        println!("Updated {} on {}", key, id);
        return Ok(());
    }

    print!("{}", dispatcher.metadata_show(&id)?);
    Ok(())
}
