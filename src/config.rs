//! Runtime configuration
//!
//! All tunables travel in an explicit `Settings` value built once at CLI
//! entry. The environment is read exactly there; engines receive values
//! and never consult `std::env` themselves.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::observability::{Logger, Severity};
use crate::platform;

/// Absolute default backup root override
pub const ENV_BACKUP_DIR: &str = "CHECKPOINT_BACKUP_DIR";
/// Non-empty value suppresses interactive prompts (treated as confirm)
pub const ENV_AUTO_CONFIRM: &str = "CHECKPOINT_AUTO_CONFIRM";

/// System-wide backup base used when running as root
pub const SYSTEM_BACKUP_BASE: &str = "/var/backups";
/// Per-user backup base under the home directory
pub const USER_BACKUP_BASE: &str = ".checkpoint";

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SELECT_TIMEOUT_SECS: u64 = 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine a home directory for the default backup root")]
    MissingHome,

    #[error("source has no usable base name: {0}")]
    BadSourceName(PathBuf),
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Explicit backup root from the caller; used verbatim
    pub backup_dir: Option<PathBuf>,
    /// Base directory from CHECKPOINT_BACKUP_DIR; `<basename>` is appended
    pub env_backup_dir: Option<PathBuf>,
    /// Suppress interactive prompts, answering yes
    pub auto_confirm: bool,
    /// Minimum severity the logger emits
    pub min_severity: Severity,
    pub lock_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    pub select_timeout_secs: u64,
    /// Identity file for the remote transport
    pub ssh_key: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_dir: None,
            env_backup_dir: None,
            auto_confirm: false,
            min_severity: Severity::Info,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            confirm_timeout_secs: DEFAULT_CONFIRM_TIMEOUT_SECS,
            select_timeout_secs: DEFAULT_SELECT_TIMEOUT_SECS,
            ssh_key: None,
        }
    }
}

impl Settings {
    /// Build settings from the process environment. This is the only
    /// place the environment is consulted.
    pub fn from_env() -> Self {
        let env_backup_dir = env::var_os(ENV_BACKUP_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let auto_confirm = env::var_os(ENV_AUTO_CONFIRM).is_some_and(|v| !v.is_empty());

        Self {
            env_backup_dir,
            auto_confirm,
            ..Self::default()
        }
    }

    /// Logger configured for this run
    pub fn logger(&self) -> Logger {
        Logger::new(self.min_severity)
    }

    /// Resolve the backup root for a source directory, in priority order:
    ///
    /// 1. Explicit `--backup-dir`
    /// 2. `CHECKPOINT_BACKUP_DIR/<basename(source)>`
    /// 3. Effective root: `/var/backups/<basename(source)>`
    /// 4. `<home>/.checkpoint/<basename(source)>`
    pub fn resolve_backup_root(&self, source: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(explicit) = &self.backup_dir {
            return Ok(explicit.clone());
        }

        let basename = source
            .file_name()
            .ok_or_else(|| ConfigError::BadSourceName(source.to_path_buf()))?;

        if let Some(base) = &self.env_backup_dir {
            return Ok(base.join(basename));
        }

        if platform::is_effective_root() {
            return Ok(PathBuf::from(SYSTEM_BACKUP_BASE).join(basename));
        }

        let home = dirs::home_dir().ok_or(ConfigError::MissingHome)?;
        Ok(home.join(USER_BACKUP_BASE).join(basename))
    }
}
