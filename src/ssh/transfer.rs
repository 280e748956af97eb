// ABOUTME: File upload and download over an SFTP channel of the session.
// ABOUTME: Also provides download-edit-upload helpers and hash verification against a local copy.

use super::client::Session;
use super::error::{Error, Result, TransferError};
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Content of an upload.
///
/// Strings and byte slices are always content; only `Path`/`PathBuf` name a
/// local file to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    LocalPath(PathBuf),
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Bytes(text.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Bytes(text.as_bytes().to_vec())
    }
}

impl From<PathBuf> for Payload {
    fn from(path: PathBuf) -> Self {
        Payload::LocalPath(path)
    }
}

impl From<&Path> for Payload {
    fn from(path: &Path) -> Self {
        Payload::LocalPath(path.to_path_buf())
    }
}

/// Local side of an upload, opened before the remote file is touched.
enum Source {
    Bytes(Vec<u8>),
    File(tokio::fs::File),
}

impl Session {
    /// Write `payload` to `remote_path`, replacing any existing file.
    ///
    /// A failed upload may leave the remote file truncated.
    pub async fn send_file(&self, remote_path: &str, payload: impl Into<Payload>) -> Result<()> {
        self.handle()?;
        let source = match payload.into() {
            Payload::Bytes(bytes) => Source::Bytes(bytes),
            Payload::LocalPath(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| TransferError::from_io(&path, &e))?;
                Source::File(file)
            }
        };

        let sftp = self.open_sftp(remote_path).await?;
        let written = upload(&sftp, remote_path, source).await;
        close_sftp(sftp).await;

        let written = written?;
        tracing::debug!(path = remote_path, bytes = written, "uploaded file");
        Ok(())
    }

    /// Read the whole of `remote_path` into memory.
    pub async fn download_file(&self, remote_path: &str) -> Result<Vec<u8>> {
        let sftp = self.open_sftp(remote_path).await?;
        let data = download(&sftp, remote_path).await;
        close_sftp(sftp).await;

        let data = data?;
        tracing::debug!(path = remote_path, bytes = data.len(), "downloaded file");
        Ok(data)
    }

    /// Compare SHA-256 digests of a remote file and a local file.
    pub async fn verify_file_hash(&self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<()> {
        self.handle()?;
        let local_path = local_path.as_ref();
        let remote = self.download_file(remote_path).await?;
        let local = tokio::fs::read(local_path)
            .await
            .map_err(|e| TransferError::from_io(local_path, &e))?;

        let remote = sha256_hex(&remote);
        let local = sha256_hex(&local);
        if remote != local {
            return Err(Error::HashMismatch { remote, local });
        }
        Ok(())
    }

    /// Download `remote_path`, transform its bytes, and upload the result.
    pub async fn edit_file<F>(&self, remote_path: &str, edit: F) -> Result<()>
    where
        F: FnOnce(Vec<u8>) -> Vec<u8>,
    {
        let content = self.download_file(remote_path).await?;
        self.send_file(remote_path, edit(content)).await
    }

    /// Replace literal text in a remote file. `limit` of None replaces every occurrence.
    pub async fn edit_file_replace(
        &self,
        remote_path: &str,
        old: &str,
        new: &str,
        limit: Option<usize>,
    ) -> Result<()> {
        self.edit_text(remote_path, |text| match limit {
            Some(n) => text.replacen(old, new, n),
            None => text.replace(old, new),
        })
        .await
    }

    /// Replace regex matches in a remote file. `replacement` may use `$1` / `${name}`.
    pub async fn edit_file_regex_replace(
        &self,
        remote_path: &str,
        pattern: &str,
        replacement: &str,
        limit: Option<usize>,
    ) -> Result<()> {
        self.handle()?;
        let regex = regex::Regex::new(pattern)?;
        self.edit_text(remote_path, |text| {
            regex
                .replacen(text, limit.unwrap_or(0), replacement)
                .into_owned()
        })
        .await
    }

    async fn edit_text<F>(&self, remote_path: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&str) -> String,
    {
        let content = self.download_file(remote_path).await?;
        let text = String::from_utf8(content).map_err(|_| TransferError::Io {
            path: PathBuf::from(remote_path),
            reason: "file is not valid UTF-8 text".to_string(),
        })?;
        self.send_file(remote_path, edit(&text)).await
    }

    /// Open a channel running the SFTP subsystem.
    async fn open_sftp(&self, remote_path: &str) -> Result<SftpSession> {
        let handle = self.handle()?;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open transfer channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to start sftp subsystem: {}", e)))?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| sftp_error(remote_path, e))
    }
}

async fn upload(sftp: &SftpSession, remote_path: &str, source: Source) -> Result<u64> {
    let io_error = |e: std::io::Error| Error::from(TransferError::from_io(remote_path, &e));

    let mut file = sftp
        .create(remote_path)
        .await
        .map_err(|e| sftp_error(remote_path, e))?;

    let written = match source {
        Source::Bytes(bytes) => {
            file.write_all(&bytes).await.map_err(io_error)?;
            bytes.len() as u64
        }
        Source::File(mut local) => tokio::io::copy(&mut local, &mut file)
            .await
            .map_err(io_error)?,
    };
    file.shutdown().await.map_err(io_error)?;
    Ok(written)
}

async fn download(sftp: &SftpSession, remote_path: &str) -> Result<Vec<u8>> {
    let mut file = sftp
        .open(remote_path)
        .await
        .map_err(|e| sftp_error(remote_path, e))?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .await
        .map_err(|e| TransferError::from_io(remote_path, &e))?;
    Ok(data)
}

async fn close_sftp(sftp: SftpSession) {
    if let Err(e) = sftp.close().await {
        tracing::debug!(error = %e, "closing sftp session failed");
    }
}

/// Classify an SFTP failure by its status code.
fn sftp_error(remote_path: &str, err: SftpError) -> Error {
    let path = PathBuf::from(remote_path);
    let transfer = match &err {
        SftpError::Status(status) if matches!(status.status_code, StatusCode::NoSuchFile) => {
            TransferError::NotFound { path }
        }
        SftpError::Status(status) if matches!(status.status_code, StatusCode::PermissionDenied) => {
            TransferError::PermissionDenied { path }
        }
        _ => TransferError::Io {
            path,
            reason: err.to_string(),
        },
    };
    Error::Transfer(transfer)
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
