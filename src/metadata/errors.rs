//! Metadata error types
//!
//! Error codes:
//! - CKPT_METADATA_IO (ERROR severity)
//! - CKPT_INVALID_METADATA_KEY (ERROR severity)
//! - CKPT_METADATA_MISSING (ERROR severity)

use std::fmt;
use std::io;

/// Metadata-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataErrorCode {
    /// Filesystem failure reading or writing a record
    Io,
    /// Key outside [A-Za-z0-9_]+
    InvalidKey,
    /// Snapshot has no .metadata file
    Missing,
}

impl MetadataErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            MetadataErrorCode::Io => "CKPT_METADATA_IO",
            MetadataErrorCode::InvalidKey => "CKPT_INVALID_METADATA_KEY",
            MetadataErrorCode::Missing => "CKPT_METADATA_MISSING",
        }
    }
}

impl fmt::Display for MetadataErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Metadata error with context
#[derive(Debug)]
pub struct MetadataError {
    code: MetadataErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl MetadataError {
    /// Filesystem failure
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: MetadataErrorCode::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Key rejected by the [A-Za-z0-9_]+ rule
    pub fn invalid_key(key: &str) -> Self {
        Self {
            code: MetadataErrorCode::InvalidKey,
            message: format!("Invalid metadata key: '{}'", key),
            source: None,
        }
    }

    /// Snapshot carries no record
    pub fn missing(path: &std::path::Path) -> Self {
        Self {
            code: MetadataErrorCode::Missing,
            message: format!("No metadata record at {}", path.display()),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> MetadataErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;
