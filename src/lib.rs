//! checkpoint - timestamped, verifiable directory snapshots
//!
//! Core subsystems cover snapshot creation, locking, retention, comparison,
//! restore, metadata, and remote dispatch over a secure shell transport.

pub mod checksum;
pub mod cleanup;
pub mod cli;
pub mod compare;
pub mod config;
pub mod exclude;
pub mod lock;
pub mod metadata;
pub mod observability;
pub mod platform;
pub mod remote;
pub mod restore;
pub mod retention;
pub mod snapshot;
