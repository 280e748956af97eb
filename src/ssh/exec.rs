// ABOUTME: Blocking command execution and its captured result.
// ABOUTME: Drains stdout and stderr of a channel until the remote process reports how it ended.

use super::client::{Session, SessionConfig, SshHandler};
use super::error::{Error, Result};
use super::input::{InputState, RemoteInput};
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Sig};
use std::time::Duration;

/// SSH extended data type for stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// How a remote process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, or -1 when the process was killed by a signal.
    pub code: i32,
    /// Signal name when the process was killed by a signal.
    pub signal: Option<String>,
}

impl ExitStatus {
    pub fn code(code: i32) -> Self {
        Self { code, signal: None }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            code: -1,
            signal: Some(name.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Output of a completed remote command.
#[derive(Debug)]
pub struct ExecutionResult {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit: ExitStatus,
    input: RemoteInput,
}

impl ExecutionResult {
    pub(crate) fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit: ExitStatus, input: RemoteInput) -> Self {
        Self {
            stdout,
            stderr,
            exit,
            input,
        }
    }

    /// True when the exit code is non-zero.
    pub fn is_fail(&self) -> bool {
        !self.exit.success()
    }

    pub fn success(&self) -> bool {
        self.exit.success()
    }

    pub fn exit_status(&self) -> &ExitStatus {
        &self.exit
    }

    pub fn exit_code(&self) -> i32 {
        self.exit.code
    }

    pub fn exit_signal(&self) -> Option<&str> {
        self.exit.signal.as_deref()
    }

    /// Stdout decoded as UTF-8, with invalid sequences replaced.
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded as UTF-8, with invalid sequences replaced.
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn stdout_bytes(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr_bytes(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout().lines().map(str::to_owned).collect()
    }

    pub fn stderr_lines(&self) -> Vec<String> {
        self.stderr().lines().map(str::to_owned).collect()
    }

    /// Send `text` and a newline to the process's stdin.
    ///
    /// Fails with [`Error::ChannelClosed`] once the process has exited, which
    /// is always the case after a plain `exec`; use [`Session::async_exec`] to
    /// answer prompts while the process runs.
    pub async fn flush(&mut self, text: &str) -> Result<()> {
        self.input.write_line(text).await
    }
}

/// Signal name without the `SIG` prefix, as the server sent it.
fn signal_label(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        standard => format!("{:?}", standard),
    }
}

/// Open a session channel and start `command` on it.
pub(crate) async fn start_command(
    handle: &Handle<SshHandler>,
    config: &SessionConfig,
    command: &str,
) -> Result<Channel<Msg>> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

    for (name, value) in &config.env {
        channel
            .set_env(false, name.as_str(), value.as_str())
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to set {}: {}", name, e)))?;
    }

    channel
        .exec(true, command)
        .await
        .map_err(|e| Error::CommandFailed(format!("failed to exec command: {}", e)))?;

    Ok(channel)
}

/// Read channel messages until the output is drained and the exit status known.
///
/// Stdout and stderr arrive interleaved on the one channel; each chunk goes to
/// its sink in arrival order.
pub(crate) async fn drain(
    channel: &mut Channel<Msg>,
    input: &InputState,
    mut on_stdout: impl FnMut(&[u8]),
    mut on_stderr: impl FnMut(&[u8]),
) -> Result<ExitStatus> {
    let mut exit = None;
    let mut got_eof = false;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                on_stdout(&data[..]);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == SSH_EXTENDED_DATA_STDERR {
                    on_stderr(&data[..]);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                input.close();
                exit = Some(ExitStatus::code(exit_status as i32));
                // If we already got EOF, we can exit now
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                input.close();
                exit = Some(ExitStatus::signal(signal_label(&signal_name)));
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::Eof) => {
                got_eof = true;
                // If we already got exit status, we can exit now
                if exit.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) => {
                break;
            }
            Some(_) => {}
            None => break,
        }
    }
    input.close();

    // If the channel closed without providing an exit status, this indicates
    // an abnormal termination (e.g., connection timeout, network issue)
    exit.ok_or(Error::MissingExitStatus)
}

impl Session {
    /// Execute a command and wait for it to finish.
    ///
    /// Uses the configured command timeout, if any.
    pub async fn exec(&self, command: &str) -> Result<ExecutionResult> {
        match self.config().command_timeout {
            Some(timeout) => self.exec_with_timeout(command, timeout).await,
            None => self.exec_inner(command).await,
        }
    }

    /// Execute a command with a custom timeout.
    pub async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        match tokio::time::timeout(timeout, self.exec_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    /// Execute several commands as one `;`-separated command line.
    pub async fn exec_batch<I, S>(&self, commands: I) -> Result<ExecutionResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = join_commands(commands)?;
        self.exec(&line).await
    }

    async fn exec_inner(&self, command: &str) -> Result<ExecutionResult> {
        let handle = self.handle()?;
        tracing::debug!(host = %self.config().host, command, "executing command");

        let mut channel = start_command(handle, self.config(), command).await?;
        let state = InputState::new();
        let input = RemoteInput::new(&channel, state.clone());

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = drain(
            &mut channel,
            &state,
            |data| stdout.extend_from_slice(data),
            |data| stderr.extend_from_slice(data),
        )
        .await?;

        tracing::debug!(
            command,
            exit_code = exit.code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "command finished"
        );

        Ok(ExecutionResult::new(stdout, stderr, exit, input))
    }
}

fn join_commands<I, S>(commands: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = commands
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect();
    if parts.is_empty() {
        return Err(Error::InvalidCommand("no commands given".to_string()));
    }
    Ok(parts.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &[u8], stderr: &[u8], exit: ExitStatus) -> ExecutionResult {
        ExecutionResult::new(stdout.to_vec(), stderr.to_vec(), exit, RemoteInput::detached())
    }

    #[test]
    fn is_fail_follows_exit_code() {
        assert!(!result(b"", b"", ExitStatus::code(0)).is_fail());
        assert!(result(b"", b"", ExitStatus::code(1)).is_fail());
        assert!(result(b"", b"", ExitStatus::code(255)).is_fail());
    }

    #[test]
    fn signal_exit_is_a_failure() {
        let r = result(b"", b"", ExitStatus::signal("KILL"));
        assert!(r.is_fail());
        assert_eq!(r.exit_code(), -1);
        assert_eq!(r.exit_signal(), Some("KILL"));
    }

    #[test]
    fn signal_labels_are_bare_names() {
        assert_eq!(signal_label(&Sig::KILL), "KILL");
        assert_eq!(signal_label(&Sig::TERM), "TERM");
        assert_eq!(signal_label(&Sig::Custom("USR3".to_string())), "USR3");
    }

    #[test]
    fn decoding_is_lossy() {
        let r = result(b"ok \xff\xfe done", b"", ExitStatus::code(0));
        assert_eq!(r.stdout(), "ok \u{fffd}\u{fffd} done");
        assert_eq!(r.stdout_bytes(), b"ok \xff\xfe done");
    }

    #[test]
    fn lines_split_on_terminators() {
        let r = result(b"one\ntwo\r\nthree", b"warn\n", ExitStatus::code(0));
        assert_eq!(r.stdout_lines(), vec!["one", "two", "three"]);
        assert_eq!(r.stderr_lines(), vec!["warn"]);
    }

    #[tokio::test]
    async fn flush_after_exit_is_refused() {
        let mut r = result(b"", b"", ExitStatus::code(0));
        assert!(matches!(r.flush("yes").await, Err(Error::ChannelClosed)));
    }

    #[test]
    fn batch_joins_with_semicolons() {
        assert_eq!(join_commands(["cd /tmp", "ls"]).unwrap(), "cd /tmp;ls");
        assert!(matches!(
            join_commands(Vec::<String>::new()),
            Err(Error::InvalidCommand(_))
        ));
    }
}
