//! Remote verb execution over a secure shell transport
//!
//! Every call tunnels through `ssh` in batch mode: public-key only, no
//! password prompts, strict host-key checking in accept-new mode, agent
//! forwarding disabled, identities limited to the configured key. The
//! tree stream rides `rsync -a --partial` with exclusions passed as
//! parameters.
//!
//! The dispatcher issues three classes of remote calls: probe (`test`,
//! `mkdir`), enumerate (`ls` filtered by the snapshot-name rules), and
//! stream (the archival mirror). Command construction is separated from
//! execution so the hardening and option plumbing stay testable without
//! a transport.
//!
//! All interpolated remote paths are built from the validated root plus
//! validated snapshot names or hex tokens; the ingress checks in spec.rs
//! are what make the interpolation safe.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use chrono::Local;
use uuid::Uuid;

use super::errors::{RemoteError, RemoteResult};
use super::spec::{validate_checkpoint_id, RemoteSpec};
use crate::exclude::DEFAULT_PATTERNS;
use crate::lock::LOCK_DIR_NAME;
use crate::metadata::{self, MetadataRecord, METADATA_FILE};
use crate::observability::Logger;
use crate::platform;
use crate::retention::{self, RetentionMode};
use crate::snapshot::{self, creator, CreateOptions, STAGE_PREFIX};

/// Dispatcher bound to one remote target
pub struct RemoteDispatcher<'a> {
    spec: RemoteSpec,
    ssh_key: Option<PathBuf>,
    connect_timeout_secs: u64,
    logger: &'a Logger,
}

impl<'a> RemoteDispatcher<'a> {
    pub fn new(
        spec: RemoteSpec,
        ssh_key: Option<PathBuf>,
        connect_timeout_secs: u64,
        logger: &'a Logger,
    ) -> Self {
        Self {
            spec,
            ssh_key,
            connect_timeout_secs,
            logger,
        }
    }

    /// The validated target
    pub fn spec(&self) -> &RemoteSpec {
        &self.spec
    }

    /// Transport options shared by every ssh invocation.
    pub fn ssh_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "PasswordAuthentication=no".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            // No agent forwarding
            "-a".to_string(),
        ];
        if let Some(key) = &self.ssh_key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        args
    }

    /// Full argument vector for one remote command.
    pub fn ssh_args(&self, remote_cmd: &str) -> Vec<String> {
        let mut args = self.ssh_base_args();
        args.push(self.spec.destination());
        args.push(remote_cmd.to_string());
        args
    }

    /// The `-e` remote shell rsync uses, carrying the same hardening.
    pub fn rsync_shell(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.ssh_base_args());
        parts.join(" ")
    }

    /// Argument vector for the push stream into a far-end directory.
    pub fn rsync_push_args(
        &self,
        source: &Path,
        remote_dir: &str,
        excludes: &[String],
    ) -> Vec<String> {
        let mut args = vec!["-a".to_string(), "--partial".to_string()];
        for pattern in DEFAULT_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .chain(excludes.iter().cloned())
        {
            args.push(format!("--exclude={}", pattern));
        }
        args.push("-e".to_string());
        args.push(self.rsync_shell());
        args.push(format!("{}/", source.display()));
        args.push(format!("{}:{}/", self.spec.destination(), remote_dir));
        args
    }

    /// Argument vector for the pull stream out of a far-end snapshot.
    pub fn rsync_pull_args(
        &self,
        checkpoint: &str,
        target: &Path,
        patterns: &[String],
    ) -> Vec<String> {
        let mut args = vec!["-a".to_string(), "--partial".to_string()];
        args.push(format!("--exclude={}", METADATA_FILE));
        if !patterns.is_empty() {
            for pattern in patterns {
                args.push(format!("--include={}", pattern));
            }
            // Descend everywhere, then drop whatever the includes missed
            args.push("--include=*/".to_string());
            args.push("--exclude=*".to_string());
            args.push("--prune-empty-dirs".to_string());
        }
        args.push("-e".to_string());
        args.push(self.rsync_shell());
        args.push(format!(
            "{}:{}/{}/",
            self.spec.destination(),
            self.spec.path,
            checkpoint
        ));
        args.push(format!("{}/", target.display()));
        args
    }

    // ---- verbs ----

    /// Enumerate far-end snapshots. Absence yields an empty list.
    pub fn list(&self) -> RemoteResult<Vec<String>> {
        let cmd = format!("ls -1 {} 2>/dev/null || true", self.spec.path);
        let output = self.run_ssh(&cmd)?;
        self.reject_transport_failure(&output)?;

        let mut names: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| snapshot::is_snapshot_name(line))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Mirror of the local create: probe, far-end lock, far-end stage,
    /// stream, metadata, far-end rename. The far-end filesystem is the
    /// authority for locking and atomic visibility.
    pub fn create(&self, source: &Path, opts: &CreateOptions) -> RemoteResult<String> {
        let root = &self.spec.path;

        let stamp = platform::timestamp_now();
        let name = match &opts.suffix {
            None => stamp,
            Some(raw) => {
                let suffix = snapshot::sanitize_suffix(raw);
                if suffix.is_empty() {
                    return Err(RemoteError::InvalidSuffix(raw.clone()));
                }
                format!("{}_{}", stamp, suffix)
            }
        };

        // Probe
        self.run_checked("create", &format!("mkdir -p {}", root))?;

        // Far-end lock; mkdir is the mutual-exclusion primitive there too
        let lock = format!("{}/{}", root, LOCK_DIR_NAME);
        if opts.force_lock {
            self.run_checked("create", &format!("rm -rf {}", lock))?;
        }
        let lock_cmd = format!(
            "mkdir {lock} && printf '%s' $$ > {lock}/pid && date +%s > {lock}/timestamp",
            lock = lock
        );
        match self.run_checked("create", &lock_cmd) {
            Ok(_) => {}
            Err(RemoteError::VerbFailed { .. }) => {
                return Err(RemoteError::VerbFailed {
                    verb: "create",
                    detail: format!("remote lock busy: {}", lock),
                })
            }
            Err(other) => return Err(other),
        }

        let token = Uuid::new_v4().simple().to_string();
        let stage = format!("{}/{}{}", root, STAGE_PREFIX, token);

        let result = self.create_staged(source, opts, &name, &stage);

        if result.is_err() {
            let _ = self.run_ssh(&format!("rm -rf {}", stage));
        }
        let _ = self.run_ssh(&format!("rm -rf {}", lock));

        result
    }

    fn create_staged(
        &self,
        source: &Path,
        opts: &CreateOptions,
        name: &str,
        stage: &str,
    ) -> RemoteResult<String> {
        self.run_checked("create", &format!("mkdir {}", stage))?;

        self.logger.info(
            "REMOTE_STAGED",
            &[("name", name), ("stage", stage)],
        );

        self.run_rsync(&self.rsync_push_args(source, stage, &opts.exclude))?;

        let record = creator::build_record(source, opts)
            .map_err(|e| RemoteError::VerbFailed {
                verb: "create",
                detail: e.to_string(),
            })?;
        self.write_remote_file(&record.to_text(), &format!("{}/{}", stage, METADATA_FILE))?;

        // Far-end publish; the rename is the commit point there as well
        self.run_checked(
            "create",
            &format!("mv {} {}/{}", stage, self.spec.path, name),
        )?;

        self.logger
            .info("REMOTE_PUBLISHED", &[("name", name)]);
        Ok(name.to_string())
    }

    /// Differences between a local source and a far-end snapshot, as
    /// itemized change lines. Empty means the snapshot verifies.
    pub fn verify(&self, checkpoint: &str, source: &Path) -> RemoteResult<Vec<String>> {
        validate_checkpoint_id(checkpoint)?;

        let mut args = vec![
            "-rlptgoni".to_string(),
            "--delete".to_string(),
            "--dry-run".to_string(),
            format!("--exclude={}", METADATA_FILE),
        ];
        args.push("-e".to_string());
        args.push(self.rsync_shell());
        args.push(format!("{}/", source.display()));
        args.push(format!(
            "{}:{}/{}/",
            self.spec.destination(),
            self.spec.path,
            checkpoint
        ));

        let output = self.run_rsync_raw(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect())
    }

    /// Itemized comparison of a far-end snapshot against a local tree.
    pub fn compare(
        &self,
        checkpoint: &str,
        live: &Path,
        patterns: &[String],
    ) -> RemoteResult<String> {
        validate_checkpoint_id(checkpoint)?;

        let mut args = vec![
            "-rlptgoni".to_string(),
            "--delete".to_string(),
            "--dry-run".to_string(),
            format!("--exclude={}", METADATA_FILE),
        ];
        if !patterns.is_empty() {
            for pattern in patterns {
                args.push(format!("--include={}", pattern));
            }
            args.push("--include=*/".to_string());
            args.push("--exclude=*".to_string());
        }
        args.push("-e".to_string());
        args.push(self.rsync_shell());
        args.push(format!("{}/", live.display()));
        args.push(format!(
            "{}:{}/{}/",
            self.spec.destination(),
            self.spec.path,
            checkpoint
        ));

        let output = self.run_rsync_raw(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Pull a far-end snapshot into a local target.
    pub fn restore(
        &self,
        checkpoint: &str,
        target: &Path,
        patterns: &[String],
    ) -> RemoteResult<()> {
        validate_checkpoint_id(checkpoint)?;

        std::fs::create_dir_all(target)?;
        self.run_rsync(&self.rsync_pull_args(checkpoint, target, patterns))?;
        self.logger.info(
            "REMOTE_RESTORED",
            &[
                ("checkpoint", checkpoint),
                ("target", &target.display().to_string()),
            ],
        );
        Ok(())
    }

    /// Apply a retention bound to the far end. Victim selection runs
    /// locally on the enumerated names; deletions run remotely.
    pub fn retain(
        &self,
        mode: &RetentionMode,
        prune_only: bool,
    ) -> RemoteResult<Vec<String>> {
        let names = self.list()?;
        let victims =
            retention::select_victims(&names, mode, prune_only, Local::now().naive_local());

        for name in &victims {
            // Names came from our own filter, but re-validate before they
            // are interpolated into a remote command
            validate_checkpoint_id(name)?;
            self.run_checked("retain", &format!("rm -rf {}/{}", self.spec.path, name))?;
            self.logger.info("REMOTE_PRUNED", &[("name", name.as_str())]);
        }
        Ok(victims)
    }

    /// Far-end metadata record, raw text.
    pub fn metadata_show(&self, checkpoint: &str) -> RemoteResult<String> {
        validate_checkpoint_id(checkpoint)?;
        let output = self.run_checked(
            "metadata",
            &format!("cat {}/{}/{}", self.spec.path, checkpoint, METADATA_FILE),
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read-modify-publish of one far-end metadata key.
    pub fn metadata_update(
        &self,
        checkpoint: &str,
        key: &str,
        value: &str,
    ) -> RemoteResult<()> {
        validate_checkpoint_id(checkpoint)?;
        if !metadata::is_valid_key(key) {
            return Err(RemoteError::InvalidMetadataKey(key.to_string()));
        }

        let mut record = MetadataRecord::parse(&self.metadata_show(checkpoint)?);
        record
            .set(key, value)
            .map_err(|e| RemoteError::InvalidMetadataKey(e.to_string()))?;

        self.write_remote_file(
            &record.to_text(),
            &format!("{}/{}/{}", self.spec.path, checkpoint, METADATA_FILE),
        )
    }

    /// Far-end equivalent of the metadata search.
    pub fn metadata_find(&self, key: &str, value: &str) -> RemoteResult<Vec<String>> {
        if !metadata::is_valid_key(key) {
            return Err(RemoteError::InvalidMetadataKey(key.to_string()));
        }

        let mut matches = Vec::new();
        for name in self.list()? {
            let cmd = format!(
                "cat {}/{}/{} 2>/dev/null || true",
                self.spec.path, name, METADATA_FILE
            );
            let output = self.run_ssh(&cmd)?;
            self.reject_transport_failure(&output)?;
            let record = MetadataRecord::parse(&String::from_utf8_lossy(&output.stdout));
            if record.get(key) == Some(value) {
                matches.push(name);
            }
        }
        Ok(matches)
    }

    /// Remove the far-end lock unconditionally.
    pub fn force_unlock(&self) -> RemoteResult<()> {
        self.run_checked(
            "force-unlock",
            &format!("rm -rf {}/{}", self.spec.path, LOCK_DIR_NAME),
        )?;
        Ok(())
    }

    // ---- execution ----

    fn run_ssh(&self, remote_cmd: &str) -> RemoteResult<Output> {
        self.logger.trace("REMOTE_SSH", &[("cmd", remote_cmd)]);
        Command::new("ssh")
            .args(self.ssh_args(remote_cmd))
            .output()
            .map_err(|e| RemoteError::Transport(format!("failed to spawn ssh: {}", e)))
    }

    fn run_checked(&self, verb: &'static str, remote_cmd: &str) -> RemoteResult<Output> {
        let output = self.run_ssh(remote_cmd)?;
        self.reject_transport_failure(&output)?;
        if !output.status.success() {
            return Err(RemoteError::VerbFailed {
                verb,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// ssh reserves exit code 255 for transport-level failures
    fn reject_transport_failure(&self, output: &Output) -> RemoteResult<()> {
        if output.status.code() == Some(255) {
            return Err(RemoteError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn run_rsync(&self, args: &[String]) -> RemoteResult<Output> {
        let output = self.run_rsync_raw(args)?;
        if !output.status.success() {
            return Err(RemoteError::VerbFailed {
                verb: "stream",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run_rsync_raw(&self, args: &[String]) -> RemoteResult<Output> {
        self.logger.trace("REMOTE_RSYNC", &[("argc", &args.len().to_string())]);
        Command::new("rsync")
            .args(args)
            .output()
            .map_err(|e| RemoteError::Transport(format!("failed to spawn rsync: {}", e)))
    }

    /// Stream content into a far-end file through stdin, publishing by
    /// rename so far-end readers never see a torn record.
    fn write_remote_file(&self, content: &str, remote_path: &str) -> RemoteResult<()> {
        let cmd = format!(
            "cat > {path}.tmp && mv {path}.tmp {path}",
            path = remote_path
        );
        let mut child = Command::new("ssh")
            .args(self.ssh_args(&cmd))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RemoteError::Transport(format!("failed to spawn ssh: {}", e)))?;

        match child.stdin.as_mut() {
            Some(stdin) => stdin.write_all(content.as_bytes())?,
            None => {
                let _ = child.kill();
                return Err(RemoteError::Transport("ssh stdin unavailable".to_string()));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| RemoteError::Transport(format!("ssh did not finish: {}", e)))?;
        self.reject_transport_failure(&output)?;
        if !output.status.success() {
            return Err(RemoteError::VerbFailed {
                verb: "metadata",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
