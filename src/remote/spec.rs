//! Remote target specification and input hardening
//!
//! A remote target is the literal `user@host:path`. The path must match
//! `^[A-Za-z0-9_./-]+$` and must not contain `..`; checkpoint ids handed
//! to remote verbs must be legal snapshot names; timeouts must be
//! positive integers. Every check here runs before any transport call.

use std::sync::OnceLock;

use regex::Regex;

use super::errors::{RemoteError, RemoteResult};
use crate::snapshot;

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_./-]+$").expect("static regex"))
}

fn account_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"))
}

/// A parsed and validated remote target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub user: String,
    pub host: String,
    pub path: String,
}

impl RemoteSpec {
    /// Parse `user@host:path`, hardening every part.
    pub fn parse(raw: &str) -> RemoteResult<Self> {
        let (account, path) = raw
            .split_once(':')
            .ok_or_else(|| RemoteError::InvalidSpec(raw.to_string()))?;
        let (user, host) = account
            .split_once('@')
            .ok_or_else(|| RemoteError::InvalidSpec(raw.to_string()))?;

        if user.is_empty() || !account_regex().is_match(user) {
            return Err(RemoteError::InvalidSpec(raw.to_string()));
        }
        if host.is_empty() || !account_regex().is_match(host) {
            return Err(RemoteError::InvalidSpec(raw.to_string()));
        }
        validate_remote_path(path)?;

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    /// The `user@host` transport destination
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Reject traversal and characters outside the safe set.
///
/// Traversal is checked first: `..` passes the character class, so the
/// substring check is the one that actually blocks it.
pub fn validate_remote_path(path: &str) -> RemoteResult<()> {
    if path.is_empty() {
        return Err(RemoteError::InvalidPathChars(path.to_string()));
    }
    if path.contains("..") {
        return Err(RemoteError::PathTraversal(path.to_string()));
    }
    if !path_regex().is_match(path) {
        return Err(RemoteError::InvalidPathChars(path.to_string()));
    }
    Ok(())
}

/// Checkpoint ids sent to remote verbs must be legal snapshot names.
pub fn validate_checkpoint_id(id: &str) -> RemoteResult<()> {
    if snapshot::is_snapshot_name(id) {
        Ok(())
    } else {
        Err(RemoteError::InvalidCheckpointId(id.to_string()))
    }
}

/// Timeouts arrive as strings from the outer surface; only positive
/// integers pass.
pub fn parse_timeout(raw: &str) -> RemoteResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(RemoteError::InvalidTimeout(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_spec() {
        let spec = RemoteSpec::parse("backup@nas01:/srv/backups/project").unwrap();

        assert_eq!(spec.user, "backup");
        assert_eq!(spec.host, "nas01");
        assert_eq!(spec.path, "/srv/backups/project");
        assert_eq!(spec.destination(), "backup@nas01");
    }

    #[test]
    fn test_parse_relative_path_allowed() {
        let spec = RemoteSpec::parse("u@h:backups/project").unwrap();
        assert_eq!(spec.path, "backups/project");
    }

    #[test]
    fn test_traversal_rejected() {
        let err = RemoteSpec::parse("user@host:/path/../etc/passwd").unwrap_err();

        assert!(matches!(err, RemoteError::PathTraversal(_)));
        assert!(err.to_string().contains("cannot contain directory traversal"));
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        for path in [
            "/srv/backups;rm -rf /",
            "/srv/$(whoami)",
            "/srv/back ups",
            "/srv/a|b",
            "/srv/a`b`",
        ] {
            let err = RemoteSpec::parse(&format!("u@h:{}", path)).unwrap_err();
            assert!(
                matches!(err, RemoteError::InvalidPathChars(_)),
                "accepted: {}",
                path
            );
        }
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(matches!(
            RemoteSpec::parse("hostonly:/path"),
            Err(RemoteError::InvalidSpec(_))
        ));
        assert!(matches!(
            RemoteSpec::parse("user@host"),
            Err(RemoteError::InvalidSpec(_))
        ));
        assert!(matches!(
            RemoteSpec::parse("@host:/path"),
            Err(RemoteError::InvalidSpec(_))
        ));
        assert!(matches!(
            RemoteSpec::parse("user@:/path"),
            Err(RemoteError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_hostile_account_rejected() {
        assert!(RemoteSpec::parse("user name@host:/path").is_err());
        assert!(RemoteSpec::parse("user@host;evil:/path").is_err());
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(RemoteSpec::parse("user@host:").is_err());
    }

    #[test]
    fn test_checkpoint_id_validation() {
        assert!(validate_checkpoint_id("20250430_091429").is_ok());
        assert!(validate_checkpoint_id("20250430_091429_tag").is_ok());
        assert!(validate_checkpoint_id("../../etc").is_err());
        assert!(validate_checkpoint_id("20250430_091429; rm -rf").is_err());
        assert!(validate_checkpoint_id("").is_err());
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(parse_timeout("30").unwrap(), 30);
        assert_eq!(parse_timeout(" 5 ").unwrap(), 5);
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-5").is_err());
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("").is_err());
    }
}
