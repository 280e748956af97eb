// ABOUTME: Write side of a command channel, used to answer prompts from a remote process.
// ABOUTME: Refuses writes once the process has exited instead of dropping them.

use super::error::{Error, Result};
use russh::Channel;
use russh::client::Msg;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Whether the remote process can still receive input.
///
/// Shared between the task reading channel messages, which closes it when the
/// process exits or the channel goes away, and the [`RemoteInput`] writer.
#[derive(Debug, Clone)]
pub(crate) struct InputState(Arc<AtomicBool>);

impl InputState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stdin of a remote process.
pub struct RemoteInput {
    writer: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    state: InputState,
}

impl std::fmt::Debug for RemoteInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInput")
            .field("open", &self.is_open())
            .finish()
    }
}

impl RemoteInput {
    pub(crate) fn new(channel: &Channel<Msg>, state: InputState) -> Self {
        Self {
            writer: Some(Box::pin(channel.make_writer())),
            state,
        }
    }

    /// Input with no channel behind it.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let state = InputState::new();
        state.close();
        Self {
            writer: None,
            state,
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some() && self.state.is_open()
    }

    /// Write `text` followed by a newline and flush it to the remote process.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write_all(&line).await
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if !self.state.is_open() {
            return Err(Error::ChannelClosed);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::ChannelClosed);
        };

        let written = match writer.write_all(data).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "write to remote input failed");
            self.writer = None;
            self.state.close();
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Send end-of-file on the process's stdin. Later writes fail.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        if !self.state.is_open() {
            return Ok(());
        }
        writer.shutdown().await.map_err(|e| {
            tracing::debug!(error = %e, "sending EOF to remote input failed");
            Error::ChannelClosed
        })
    }
}
