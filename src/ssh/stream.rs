// ABOUTME: Streaming command execution that hands stdout to a callback as it arrives.
// ABOUTME: One spawned task per command; the returned handle can feed input and await the exit.

use super::client::Session;
use super::error::{Error, Result};
use super::exec::{ExitStatus, drain, start_command};
use super::input::{InputState, RemoteInput};
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of a streamed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Channel open, streaming task not yet running.
    Starting,
    /// Output is being delivered.
    Streaming,
    /// The channel ended; no more chunks will arrive.
    Finished,
}

/// Handle to a command started with [`Session::async_exec`].
///
/// Dropping the handle detaches it: the command keeps streaming to its
/// callback until the channel ends.
#[derive(Debug)]
pub struct StreamHandle {
    input: RemoteInput,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<Result<ExitStatus>>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == StreamState::Finished
    }

    /// Send `text` and a newline to the running process's stdin.
    pub async fn send_input(&mut self, text: &str) -> Result<()> {
        self.input.write_line(text).await
    }

    /// Send end-of-file on the process's stdin.
    pub async fn close_input(&mut self) -> Result<()> {
        self.input.close().await
    }

    /// Wait for the stream to end and return the process's exit status.
    pub async fn wait(self) -> Result<ExitStatus> {
        self.task
            .await
            .map_err(|e| Error::CommandFailed(format!("streaming task failed: {}", e)))?
    }

    /// Stop delivering output and drop the channel.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Session {
    /// Start `command` and return as soon as it is running.
    ///
    /// Each non-empty stdout chunk is passed to `on_output` in the order it
    /// arrives, from a spawned task. Stderr is not delivered. The returned
    /// handle may be ignored by callers that only want the chunks.
    pub async fn async_exec<F>(&self, command: &str, mut on_output: F) -> Result<StreamHandle>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let handle = self.handle()?;
        tracing::debug!(host = %self.config().host, command, "streaming command");

        let mut channel = start_command(handle, self.config(), command).await?;
        let input_state = InputState::new();
        let input = RemoteInput::new(&channel, input_state.clone());
        let (state_tx, state_rx) = watch::channel(StreamState::Starting);
        let command = command.to_string();

        let task = tokio::spawn(async move {
            state_tx.send_replace(StreamState::Streaming);

            let mut delivered = 0usize;
            let exit = drain(
                &mut channel,
                &input_state,
                |data| {
                    if !data.is_empty() {
                        delivered += data.len();
                        on_output(Bytes::copy_from_slice(data));
                    }
                },
                |data| tracing::trace!(len = data.len(), "stderr from streamed command not delivered"),
            )
            .await;

            state_tx.send_replace(StreamState::Finished);
            match &exit {
                Ok(status) => tracing::debug!(
                    command = %command,
                    exit_code = status.code,
                    delivered,
                    "streamed command finished"
                ),
                Err(e) => tracing::debug!(command = %command, error = %e, "streamed command ended abnormally"),
            }
            exit
        });

        Ok(StreamHandle {
            input,
            state: state_rx,
            task,
        })
    }
}
