// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, execution and file transfer failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: no valid credentials")]
    AuthenticationFailed,

    #[error("host key for {host}:{port} was rejected")]
    HostKeyRejected { host: String, port: u16 },

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {source_name}: {reason}")]
    KeyLoadFailed { source_name: String, reason: String },

    #[error("private key is encrypted and requires a valid passphrase")]
    KeyPassphraseRequired,

    #[error("session is not open")]
    ConnectionClosed,

    #[error("remote input is closed")]
    ChannelClosed,

    #[error("channel closed unexpectedly without exit status")]
    MissingExitStatus,

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("hash mismatch: remote {remote} differs from local {local}")]
    HashMismatch { remote: String, local: String },

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Credentials or host identity were refused.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed
                | Error::HostKeyRejected { .. }
                | Error::AgentUnavailable(_)
                | Error::KeyLoadFailed { .. }
                | Error::KeyPassphraseRequired
        )
    }

    /// The network or the SSH transport failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }
}

/// File transfer failures, classified so callers can branch on the kind.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("transfer of {} failed: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl TransferError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            TransferError::NotFound { path }
            | TransferError::PermissionDenied { path }
            | TransferError::Io { path, .. } => path,
        }
    }

    /// Classify a local or stream-level I/O error.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => TransferError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => TransferError::PermissionDenied { path },
            _ => TransferError::Io {
                path,
                reason: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
