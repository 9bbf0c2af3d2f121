//! Lock error types
//!
//! Error codes:
//! - CKPT_LOCK_TIMEOUT (ERROR severity)
//! - CKPT_LOCK_STOLEN (ERROR severity)
//! - CKPT_LOCK_IO (ERROR severity)

use std::fmt;
use std::io;

/// Lock-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorCode {
    /// Another live process held the lock for the whole timeout window
    Timeout,
    /// The lock on disk no longer names this holder
    Stolen,
    /// Filesystem failure while manipulating the lock
    Io,
}

impl LockErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LockErrorCode::Timeout => "CKPT_LOCK_TIMEOUT",
            LockErrorCode::Stolen => "CKPT_LOCK_STOLEN",
            LockErrorCode::Io => "CKPT_LOCK_IO",
        }
    }
}

impl fmt::Display for LockErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Lock error with context
#[derive(Debug)]
pub struct LockError {
    code: LockErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl LockError {
    /// Acquisition gave up after the timeout window
    pub fn timeout(root: &std::path::Path, waited_secs: u64) -> Self {
        Self {
            code: LockErrorCode::Timeout,
            message: format!(
                "Failed to acquire lock on {} after {}s",
                root.display(),
                waited_secs
            ),
            source: None,
        }
    }

    /// The lock's pid record no longer matches the holder
    pub fn stolen(root: &std::path::Path, expected: u32) -> Self {
        Self {
            code: LockErrorCode::Stolen,
            message: format!(
                "Lock on {} no longer belongs to pid {}",
                root.display(),
                expected
            ),
            source: None,
        }
    }

    /// Filesystem failure
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LockErrorCode::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> LockErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_codes() {
        assert_eq!(LockErrorCode::Timeout.code(), "CKPT_LOCK_TIMEOUT");
        assert_eq!(LockErrorCode::Stolen.code(), "CKPT_LOCK_STOLEN");
        assert_eq!(LockErrorCode::Io.code(), "CKPT_LOCK_IO");
    }

    #[test]
    fn test_timeout_message_names_root_and_window() {
        let err = LockError::timeout(Path::new("/tmp/bak"), 30);

        assert_eq!(err.code(), LockErrorCode::Timeout);
        assert!(err.message().contains("Failed to acquire lock"));
        assert!(err.message().contains("/tmp/bak"));
        assert!(err.message().contains("30s"));
    }

    #[test]
    fn test_display_contains_code() {
        let err = LockError::stolen(Path::new("/tmp/bak"), 1234);
        let display = format!("{}", err);

        assert!(display.contains("CKPT_LOCK_STOLEN"));
        assert!(display.contains("1234"));
    }
}
