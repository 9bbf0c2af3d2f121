//! CLI-level errors and exit-code mapping
//!
//! Exit codes:
//! - 0  success
//! - 1  generic runtime failure
//! - 2  missing required argument (clap's own exit)
//! - 22 invalid option value
//! - 3  lock not acquired
//! - 4  verification mismatch
//! - 5  partial restore

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::metadata::{MetadataError, MetadataErrorCode};
use crate::platform::PlatformError;
use crate::remote::RemoteError;
use crate::restore::RestoreError;
use crate::snapshot::{SnapshotError, SnapshotErrorCode};

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Generic runtime failure
    Runtime,
    /// An option value failed validation
    InvalidValue,
    /// The backup-root lock could not be acquired or released
    LockFailed,
    /// A verification found a mismatch
    VerifyMismatch,
    /// A restore completed with per-file failures
    PartialRestore,
}

impl CliErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            CliErrorCode::Runtime => "CKPT_FAILED",
            CliErrorCode::InvalidValue => "CKPT_INVALID_VALUE",
            CliErrorCode::LockFailed => "CKPT_LOCK_FAILED",
            CliErrorCode::VerifyMismatch => "CKPT_VERIFY_MISMATCH",
            CliErrorCode::PartialRestore => "CKPT_PARTIAL_RESTORE",
        }
    }

    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            CliErrorCode::Runtime => 1,
            CliErrorCode::InvalidValue => 22,
            CliErrorCode::LockFailed => 3,
            CliErrorCode::VerifyMismatch => 4,
            CliErrorCode::PartialRestore => 5,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Generic runtime failure
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Runtime, msg)
    }

    /// Invalid option value (exit 22)
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidValue, msg)
    }

    /// Restore completed with failures (exit 5)
    pub fn partial_restore(failed: usize) -> Self {
        Self::new(
            CliErrorCode::PartialRestore,
            format!("Restore completed with {} failed files", failed),
        )
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<SnapshotError> for CliError {
    fn from(e: SnapshotError) -> Self {
        let code = match e.code() {
            SnapshotErrorCode::LockFailed => CliErrorCode::LockFailed,
            SnapshotErrorCode::VerifyMismatch => CliErrorCode::VerifyMismatch,
            SnapshotErrorCode::InvalidSuffix => CliErrorCode::InvalidValue,
            _ => CliErrorCode::Runtime,
        };
        Self::new(code, e.message().to_string())
    }
}

impl From<LockError> for CliError {
    fn from(e: LockError) -> Self {
        Self::new(CliErrorCode::LockFailed, e.message().to_string())
    }
}

impl From<MetadataError> for CliError {
    fn from(e: MetadataError) -> Self {
        let code = match e.code() {
            MetadataErrorCode::InvalidKey => CliErrorCode::InvalidValue,
            _ => CliErrorCode::Runtime,
        };
        Self::new(code, e.message().to_string())
    }
}

impl From<RestoreError> for CliError {
    fn from(e: RestoreError) -> Self {
        Self::runtime(e.message().to_string())
    }
}

impl From<RemoteError> for CliError {
    fn from(e: RemoteError) -> Self {
        // A malformed timeout is an option-value problem; everything else
        // in the remote path reports as a generic failure
        match e {
            RemoteError::InvalidTimeout(_) => Self::invalid_value(e.to_string()),
            _ => Self::runtime(e.to_string()),
        }
    }
}

impl From<PlatformError> for CliError {
    fn from(e: PlatformError) -> Self {
        Self::runtime(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::runtime(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::runtime(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
