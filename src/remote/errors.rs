//! Remote dispatcher error types
//!
//! Input hardening failures (path traversal, illegal characters, bad
//! checkpoint ids, bad timeouts) are all rejected before any transport
//! call is issued.

use std::io;

use thiserror::Error;

/// Remote dispatcher errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid remote specification '{0}': expected user@host:path")]
    InvalidSpec(String),

    #[error("remote path cannot contain directory traversal: {0}")]
    PathTraversal(String),

    #[error("remote path contains characters outside [A-Za-z0-9_./-]: {0}")]
    InvalidPathChars(String),

    #[error("invalid checkpoint id: {0}")]
    InvalidCheckpointId(String),

    #[error("invalid metadata key: {0}")]
    InvalidMetadataKey(String),

    #[error("suffix '{0}' is empty after sanitisation")]
    InvalidSuffix(String),

    #[error("timeout must be a positive integer: {0}")]
    InvalidTimeout(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("remote {verb} failed: {detail}")]
    VerbFailed { verb: &'static str, detail: String },

    #[error("remote I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;
