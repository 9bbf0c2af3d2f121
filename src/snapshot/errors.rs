//! Snapshot error types
//!
//! Error codes:
//! - CKPT_SNAPSHOT_FAILED (ERROR severity)
//! - CKPT_SNAPSHOT_IO (ERROR severity)
//! - CKPT_STAGE_FAILED (ERROR severity)
//! - CKPT_PUBLISH_FAILED (ERROR severity)
//! - CKPT_VERIFY_MISMATCH (ERROR severity)
//! - CKPT_INSUFFICIENT_SPACE (ERROR severity)
//! - CKPT_INVALID_SUFFIX (ERROR severity)
//! - CKPT_LOCK_FAILED (ERROR severity; wraps the lock manager's error)

use std::fmt;
use std::io;

use crate::lock::LockError;

/// Snapshot-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorCode {
    /// General creation failure
    Failed,
    /// I/O failure outside the stage
    Io,
    /// Write error inside the stage
    StageFailed,
    /// Stage complete but the atomic rename failed
    PublishFailed,
    /// Source and snapshot disagree
    VerifyMismatch,
    /// Free space below size × 1.1
    InsufficientSpace,
    /// Suffix empty after sanitisation
    InvalidSuffix,
    /// Root lock could not be acquired or released
    LockFailed,
}

impl SnapshotErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotErrorCode::Failed => "CKPT_SNAPSHOT_FAILED",
            SnapshotErrorCode::Io => "CKPT_SNAPSHOT_IO",
            SnapshotErrorCode::StageFailed => "CKPT_STAGE_FAILED",
            SnapshotErrorCode::PublishFailed => "CKPT_PUBLISH_FAILED",
            SnapshotErrorCode::VerifyMismatch => "CKPT_VERIFY_MISMATCH",
            SnapshotErrorCode::InsufficientSpace => "CKPT_INSUFFICIENT_SPACE",
            SnapshotErrorCode::InvalidSuffix => "CKPT_INVALID_SUFFIX",
            SnapshotErrorCode::LockFailed => "CKPT_LOCK_FAILED",
        }
    }
}

impl fmt::Display for SnapshotErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot error with full context
#[derive(Debug)]
pub struct SnapshotError {
    code: SnapshotErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl SnapshotError {
    /// General failure without an I/O source
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::Failed,
            message: message.into(),
            source: None,
        }
    }

    /// I/O failure outside the stage
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    /// I/O failure with path context
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::Io,
            message: format!("I/O error at path: {}", path.display()),
            source: Some(source),
        }
    }

    /// Write error inside the stage
    pub fn stage_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::StageFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    /// The commit-point rename failed
    pub fn publish_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::PublishFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Source and snapshot disagree
    pub fn verify_mismatch(detail: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::VerifyMismatch,
            message: format!("Verification mismatch: {}", detail.into()),
            source: None,
        }
    }

    /// Free space below the required margin
    pub fn insufficient_space(required_kb: u64, free_kb: u64) -> Self {
        Self {
            code: SnapshotErrorCode::InsufficientSpace,
            message: format!(
                "Insufficient space: need {} KB (incl. 10% margin), {} KB free",
                required_kb, free_kb
            ),
            source: None,
        }
    }

    /// Suffix empty after stripping invalid characters
    pub fn invalid_suffix(raw: &str) -> Self {
        Self {
            code: SnapshotErrorCode::InvalidSuffix,
            message: format!("Suffix '{}' is empty after sanitisation", raw),
            source: None,
        }
    }

    /// Wrap a lock manager failure, preserving its message
    pub fn lock(err: LockError) -> Self {
        Self {
            code: SnapshotErrorCode::LockFailed,
            message: err.message().to_string(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SnapshotErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;
