//! Restore error types
//!
//! Error codes:
//! - CKPT_RESTORE_FAILED (ERROR severity)
//! - CKPT_RESTORE_IO (ERROR severity)
//! - CKPT_RESTORE_CANCELLED (ERROR severity)
//!
//! Per-file failures are not errors here: they collect in the restore
//! report and the CLI maps a partial report to its own exit code.

use std::fmt;
use std::io;

/// Restore-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorCode {
    /// The restore could not start
    Failed,
    /// Filesystem failure outside per-file copying
    Io,
    /// The user declined, or the confirmation prompt timed out
    Cancelled,
}

impl RestoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            RestoreErrorCode::Failed => "CKPT_RESTORE_FAILED",
            RestoreErrorCode::Io => "CKPT_RESTORE_IO",
            RestoreErrorCode::Cancelled => "CKPT_RESTORE_CANCELLED",
        }
    }
}

impl fmt::Display for RestoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Restore error with context
#[derive(Debug)]
pub struct RestoreError {
    code: RestoreErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl RestoreError {
    /// The restore could not start
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: RestoreErrorCode::Failed,
            message: message.into(),
            source: None,
        }
    }

    /// Filesystem failure
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: RestoreErrorCode::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Confirmation declined or timed out
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            code: RestoreErrorCode::Cancelled,
            message: format!("Restore cancelled: {}", reason.into()),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> RestoreErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for RestoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;
