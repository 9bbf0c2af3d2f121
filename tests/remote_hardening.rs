//! Remote input hardening tests
//!
//! Every hostile input must be rejected during validation, before any
//! transport call could be issued. These tests exercise only the pure
//! parsing/validation layer and the command construction; nothing here
//! spawns ssh or rsync.

use std::path::Path;

use checkpoint::observability::{Logger, Severity};
use checkpoint::remote::{
    parse_timeout, validate_checkpoint_id, validate_remote_path, RemoteDispatcher,
    RemoteError, RemoteSpec,
};

fn quiet_logger() -> Logger {
    Logger::new(Severity::Fatal)
}

#[test]
fn test_traversal_rejected_with_expected_message() {
    let err = RemoteSpec::parse("user@host:/path/../etc/passwd").unwrap_err();

    assert!(matches!(err, RemoteError::PathTraversal(_)));
    assert!(
        err.to_string().contains("cannot contain directory traversal"),
        "message was: {}",
        err
    );
}

#[test]
fn test_embedded_traversal_rejected() {
    for path in ["..", "../x", "x/..", "a/../b", "..hidden/../../etc"] {
        assert!(
            validate_remote_path(path).is_err(),
            "accepted traversal: {}",
            path
        );
    }
}

#[test]
fn test_characters_outside_safe_set_rejected() {
    for path in [
        "/srv/bak;id",
        "/srv/bak&&true",
        "/srv/bak|tee",
        "/srv/bak$(reboot)",
        "/srv/bak`reboot`",
        "/srv/bak with space",
        "/srv/bak\n/etc",
        "/srv/bak'quote",
    ] {
        assert!(
            validate_remote_path(path).is_err(),
            "accepted hostile path: {:?}",
            path
        );
    }
}

#[test]
fn test_legitimate_paths_accepted() {
    for path in [
        "/srv/backups/project",
        "backups/project",
        "/var/backups/my_app-2.0",
        "/home/user/.checkpoint/proj",
    ] {
        assert!(
            validate_remote_path(path).is_ok(),
            "rejected legitimate path: {}",
            path
        );
    }
}

#[test]
fn test_checkpoint_ids_validated_against_name_rules() {
    assert!(validate_checkpoint_id("20250430_091429").is_ok());
    assert!(validate_checkpoint_id("20250430_091429_pre-deploy").is_ok());

    for id in [
        "../../etc/passwd",
        "20250430_091429;reboot",
        "20250430_091429 extra",
        "*",
        "",
    ] {
        assert!(
            validate_checkpoint_id(id).is_err(),
            "accepted hostile id: {:?}",
            id
        );
    }
}

#[test]
fn test_timeout_values_validated() {
    assert_eq!(parse_timeout("30").unwrap(), 30);
    assert!(parse_timeout("0").is_err());
    assert!(parse_timeout("-1").is_err());
    assert!(parse_timeout("30; reboot").is_err());
}

#[test]
fn test_dispatcher_rejects_bad_ids_before_any_transport() {
    let logger = quiet_logger();
    let dispatcher = RemoteDispatcher::new(
        RemoteSpec::parse("backup@nas01:/srv/backups/project").unwrap(),
        None,
        30,
        &logger,
    );

    // All of these must fail in validation; a transport attempt against
    // the nonexistent host nas01 would surface as a Transport error
    // instead, which would fail the match
    assert!(matches!(
        dispatcher.metadata_show("../../etc"),
        Err(RemoteError::InvalidCheckpointId(_))
    ));
    assert!(matches!(
        dispatcher.verify("x;y", Path::new("/tmp")),
        Err(RemoteError::InvalidCheckpointId(_))
    ));
    assert!(matches!(
        dispatcher.restore("bad id", Path::new("/tmp"), &[]),
        Err(RemoteError::InvalidCheckpointId(_))
    ));
    assert!(matches!(
        dispatcher.metadata_update("20250430_091429", "bad key", "v"),
        Err(RemoteError::InvalidMetadataKey(_))
    ));
}

#[test]
fn test_transport_arguments_carry_hardening() {
    let logger = quiet_logger();
    let dispatcher = RemoteDispatcher::new(
        RemoteSpec::parse("backup@nas01:/srv/backups/project").unwrap(),
        Some("/home/u/.ssh/backup_ed25519".into()),
        15,
        &logger,
    );

    let joined = dispatcher.ssh_base_args().join(" ");
    assert!(joined.contains("BatchMode=yes"));
    assert!(joined.contains("PasswordAuthentication=no"));
    assert!(joined.contains("StrictHostKeyChecking=accept-new"));
    assert!(joined.contains("ConnectTimeout=15"));
    assert!(joined.contains("IdentitiesOnly=yes"));
    assert!(joined.contains("-a"), "agent forwarding must be disabled");

    // The rsync remote shell inherits the same options
    let shell = dispatcher.rsync_shell();
    assert!(shell.contains("BatchMode=yes"));
    assert!(shell.contains("StrictHostKeyChecking=accept-new"));
}

#[test]
fn test_push_stream_carries_exclusions_as_parameters() {
    let logger = quiet_logger();
    let dispatcher = RemoteDispatcher::new(
        RemoteSpec::parse("backup@nas01:/srv/backups/project").unwrap(),
        None,
        30,
        &logger,
    );

    let args = dispatcher.rsync_push_args(
        Path::new("/home/u/project"),
        "/srv/backups/project/.tmp.deadbeef",
        &["node_modules/".to_string(), "*.log".to_string()],
    );

    assert!(args.contains(&"--exclude=node_modules/".to_string()));
    assert!(args.contains(&"--exclude=*.log".to_string()));
    // Defaults ride along too
    assert!(args.contains(&"--exclude=.checkpoint.lock".to_string()));
    assert!(args.contains(&"--exclude=.tmp.*".to_string()));
    assert!(args.contains(&"--partial".to_string()));
}
