// ABOUTME: Integration tests for file transfer over the session's SFTP channel.
// ABOUTME: Covers round trips, local-file uploads, error kinds, hashing and in-place edits.

mod support;

use fastssh::ssh::{Error, Payload, Session, TransferError};
use std::path::{Path, PathBuf};
use support::ssh_container::shared_container;

/// Unique remote path per test so tests can run in parallel.
fn remote_path(name: &str) -> String {
    format!("/tmp/fastssh-{}-{}", std::process::id(), name)
}

async fn open_session() -> Session {
    let container = shared_container().await;
    Session::connect(container.session_config())
        .await
        .expect("connection should succeed")
}

/// Test: Bytes sent come back unchanged, including NUL bytes.
#[tokio::test]
async fn binary_round_trip() {
    let mut session = open_session().await;
    let path = remote_path("binary");
    let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();

    session
        .send_file(&path, payload.clone())
        .await
        .expect("upload should succeed");
    let downloaded = session.download_file(&path).await.expect("download should succeed");

    assert_eq!(downloaded, payload);
    session.close().await.expect("close should succeed");
}

/// Test: Empty content creates an empty file.
#[tokio::test]
async fn empty_round_trip() {
    let mut session = open_session().await;
    let path = remote_path("empty");

    session.send_file(&path, Vec::new()).await.expect("upload should succeed");
    let downloaded = session.download_file(&path).await.expect("download should succeed");

    assert!(downloaded.is_empty());
    session.close().await.expect("close should succeed");
}

/// Test: Uploading replaces the previous contents entirely.
#[tokio::test]
async fn upload_overwrites_existing_file() {
    let mut session = open_session().await;
    let path = remote_path("overwrite");

    session.send_file(&path, "a much longer first version").await.unwrap();
    session.send_file(&path, "short").await.unwrap();

    assert_eq!(session.download_file(&path).await.unwrap(), b"short");
    session.close().await.expect("close should succeed");
}

/// Test: A local path payload uploads the file contents, not the path.
#[tokio::test]
async fn local_file_upload() {
    let mut session = open_session().await;
    let path = remote_path("local");

    let temp_dir = tempfile::tempdir().unwrap();
    let local = temp_dir.path().join("source.txt");
    std::fs::write(&local, b"from disk\0with nul").unwrap();

    session
        .send_file(&path, local.as_path())
        .await
        .expect("upload should succeed");
    assert_eq!(
        session.download_file(&path).await.unwrap(),
        b"from disk\0with nul"
    );

    // A string that happens to be a path is still content
    let as_text = local.to_string_lossy().into_owned();
    session.send_file(&path, as_text.as_str()).await.unwrap();
    assert_eq!(session.download_file(&path).await.unwrap(), as_text.as_bytes());

    session.close().await.expect("close should succeed");
}

/// Test: A missing local source fails before the remote file is touched.
#[tokio::test]
async fn missing_local_file_is_not_found() {
    let mut session = open_session().await;
    let path = remote_path("untouched");
    session.send_file(&path, "keep me").await.unwrap();

    let err = session
        .send_file(&path, Payload::LocalPath(PathBuf::from("/nonexistent/local.bin")))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Transfer(TransferError::NotFound { ref path }) if path == Path::new("/nonexistent/local.bin")),
        "got: {:?}",
        err
    );
    assert_eq!(session.download_file(&path).await.unwrap(), b"keep me");

    session.close().await.expect("close should succeed");
}

/// Test: Downloading a missing remote file reports NotFound.
#[tokio::test]
async fn missing_remote_file_is_not_found() {
    let mut session = open_session().await;

    let err = session
        .download_file("/tmp/fastssh-does-not-exist")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Transfer(TransferError::NotFound { .. })),
        "got: {:?}",
        err
    );

    session.close().await.expect("close should succeed");
}

/// Test: Unreadable and unwritable remote paths report PermissionDenied.
#[tokio::test]
async fn protected_paths_are_permission_denied() {
    let mut session = open_session().await;

    let err = session.download_file("/etc/shadow").await.unwrap_err();
    assert!(
        matches!(err, Error::Transfer(TransferError::PermissionDenied { .. })),
        "got: {:?}",
        err
    );

    let err = session.send_file("/etc/fastssh-denied", "x").await.unwrap_err();
    assert!(
        matches!(err, Error::Transfer(TransferError::PermissionDenied { .. })),
        "got: {:?}",
        err
    );

    session.close().await.expect("close should succeed");
}

/// Test: Hash verification passes for identical files and reports both digests otherwise.
#[tokio::test]
async fn verify_file_hash_compares_contents() {
    let mut session = open_session().await;
    let path = remote_path("hash");

    let temp_dir = tempfile::tempdir().unwrap();
    let local = temp_dir.path().join("copy.bin");
    std::fs::write(&local, b"same bytes").unwrap();

    session.send_file(&path, local.as_path()).await.unwrap();
    session
        .verify_file_hash(&path, &local)
        .await
        .expect("hashes should match");

    std::fs::write(&local, b"other bytes").unwrap();
    let err = session.verify_file_hash(&path, &local).await.unwrap_err();
    match err {
        Error::HashMismatch { remote, local } => {
            assert_ne!(remote, local);
            assert_eq!(remote.len(), 64);
        }
        other => panic!("expected HashMismatch, got: {:?}", other),
    }

    session.close().await.expect("close should succeed");
}

/// Test: Literal and regex replacement edit the remote file in place.
#[tokio::test]
async fn edit_file_replacements() {
    let mut session = open_session().await;
    let path = remote_path("edit");

    session
        .send_file(&path, "port=22\nport=22\nhost=old\n")
        .await
        .unwrap();

    session
        .edit_file_replace(&path, "port=22", "port=2222", Some(1))
        .await
        .unwrap();
    assert_eq!(
        session.download_file(&path).await.unwrap(),
        b"port=2222\nport=22\nhost=old\n"
    );

    session
        .edit_file_regex_replace(&path, r"host=(\w+)", "host=${1}-new", None)
        .await
        .unwrap();
    assert_eq!(
        session.download_file(&path).await.unwrap(),
        b"port=2222\nport=22\nhost=old-new\n"
    );

    session
        .edit_file(&path, |bytes| bytes.to_ascii_uppercase())
        .await
        .unwrap();
    assert_eq!(
        session.download_file(&path).await.unwrap(),
        b"PORT=2222\nPORT=22\nHOST=OLD-NEW\n"
    );

    session.close().await.expect("close should succeed");
}

/// Test: An invalid pattern fails without touching the file.
#[tokio::test]
async fn invalid_regex_is_rejected() {
    let mut session = open_session().await;
    let path = remote_path("regex");
    session.send_file(&path, "unchanged").await.unwrap();

    let err = session
        .edit_file_regex_replace(&path, "(unclosed", "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPattern(_)), "got: {:?}", err);
    assert_eq!(session.download_file(&path).await.unwrap(), b"unchanged");

    session.close().await.expect("close should succeed");
}
