//! Structured logging for engine events

pub mod logger;

pub use logger::{Logger, Severity};
