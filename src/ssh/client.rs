// ABOUTME: SSH session management using russh.
// ABOUTME: Handles configuration, host key checks, and the open/close lifecycle.

use super::auth::{self, Auth, KeySource};
use super::error::{Error, Result};
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Secret presented during authentication (default: agent).
    pub auth: Auth,
    /// Accept and record unknown host keys (default: true).
    /// Changed keys are rejected either way.
    pub trust_on_first_use: bool,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Bound on TCP connect plus handshake (default: 30 seconds).
    pub connect_timeout: Duration,
    /// Bound applied by `Session::exec`. None waits for the command indefinitely.
    pub command_timeout: Option<Duration>,
    /// Environment variables requested on each command channel.
    pub env: Vec<(String, String)>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            auth: Auth::Agent,
            trust_on_first_use: true,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
            env: Vec::new(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Auth::Password(SecretString::new(password.into()));
        self
    }

    pub fn private_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth = Auth::PrivateKey {
            key: KeySource::Path(path.into()),
            passphrase: None,
        };
        self
    }

    pub fn private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.auth = Auth::PrivateKey {
            key: KeySource::Pem(SecretString::new(pem.into())),
            passphrase: None,
        };
        self
    }

    /// Passphrase for an encrypted private key. No effect on other auth methods.
    pub fn key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        if let Auth::PrivateKey { passphrase: slot, .. } = &mut self.auth {
            *slot = Some(SecretString::new(passphrase.into()));
        }
        self
    }

    pub fn agent(mut self) -> Self {
        self.auth = Auth::Agent;
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Reject configurations that can never authenticate.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidCredentials("host cannot be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(Error::InvalidCredentials(
                "username cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
    /// Set when the server key was refused, so the connect error can say so.
    rejected: Arc<AtomicBool>,
}

impl SshHandler {
    fn new(config: &SessionConfig, rejected: Arc<AtomicBool>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
            rejected,
        }
    }

    fn verdict(&self, accepted: bool) -> bool {
        if !accepted {
            self.rejected
                .store(true, Ordering::SeqCst);
        }
        accepted
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        let accepted = match check_result {
            Ok(true) => true,
            Ok(false) => {
                // Host not in known_hosts
                if self.trust_on_first_use {
                    tracing::warn!(
                        host = %self.host,
                        port = self.port,
                        "Trust-On-First-Use: accepting unknown host key"
                    );
                    let learn_result = match &self.known_hosts_path {
                        Some(path) => {
                            learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                        }
                        None => learn_known_hosts(&self.host, self.port, server_public_key),
                    };
                    if let Err(e) = learn_result {
                        tracing::warn!("Failed to save host key to known_hosts: {}", e);
                    }
                    true
                } else {
                    false
                }
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!(
                    host = %self.host,
                    port = self.port,
                    "host key does not match known_hosts entry"
                );
                false
            }
            // Unreadable known_hosts is treated as an unknown host
            Err(_) => self.trust_on_first_use,
        };

        Ok(self.verdict(accepted))
    }
}

/// An authenticated connection to one remote host.
///
/// A session starts closed. `open` connects and authenticates; `close`
/// disconnects. Both are idempotent. Every remote operation on a closed
/// session fails with [`Error::ConnectionClosed`].
///
/// Operations take `&self` and each opens its own channel, so commands and
/// transfers never share a byte stream. The session does no locking of its
/// own; callers that issue concurrent operations order them themselves.
pub struct Session {
    config: SessionConfig,
    handle: Option<Handle<SshHandler>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Session {
    /// Build a closed session. No I/O happens until [`Session::open`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// Build and open a session.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.open().await?;
        Ok(session)
    }

    /// Open a session, run `body` with it, and close it whatever `body` returned.
    ///
    /// An error from `body` wins over an error from closing.
    pub async fn scoped<T, F>(config: SessionConfig, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session) -> Result<T>,
    {
        let mut session = Self::connect(config).await?;
        let outcome = body(&mut session).await;
        let closed = session.close().await;
        match outcome {
            Ok(value) => closed.map(|()| value),
            Err(e) => {
                if let Err(close_err) = closed {
                    tracing::debug!(error = %close_err, "close after failed scope also failed");
                }
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    /// Connect and authenticate. Does nothing if already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        // A handle whose connection died is released before reconnecting
        self.handle = None;

        self.config.validate()?;
        let config = &self.config;

        tracing::debug!(host = %config.host, port = config.port, user = %config.user, "opening SSH session");

        // Keep idle sessions alive between operations
        let russh_config = Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let rejected = Arc::new(AtomicBool::new(false));
        let handler = SshHandler::new(config, Arc::clone(&rejected));

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        );

        let mut session = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out after {:?} connecting to {}:{}",
                    config.connect_timeout, config.host, config.port
                ))
            })?
            .map_err(|e| {
                if rejected.load(Ordering::SeqCst) {
                    Error::HostKeyRejected {
                        host: config.host.clone(),
                        port: config.port,
                    }
                } else if e.to_string().contains("Connection refused") {
                    Error::Connection(format!(
                        "connection refused to {}:{}",
                        config.host, config.port
                    ))
                } else {
                    Error::Connection(e.to_string())
                }
            })?;

        if let Err(e) = auth::authenticate(&mut session, &config.user, &config.auth).await {
            let _ = session
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(e);
        }

        tracing::debug!(host = %config.host, port = config.port, "SSH session authenticated");
        self.handle = Some(session);
        Ok(())
    }

    /// Disconnect the session. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        tracing::debug!(host = %self.config.host, port = self.config.port, "closing SSH session");

        if handle.is_closed() {
            return Ok(());
        }
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }

    /// The live handle, or `ConnectionClosed`.
    pub(crate) fn handle(&self) -> Result<&Handle<SshHandler>> {
        match &self.handle {
            Some(handle) if !handle.is_closed() => Ok(handle),
            _ => Err(Error::ConnectionClosed),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_closed() {
            return;
        }
        // Best effort: outside a runtime the handle drop alone ends the connection
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = handle
                    .disconnect(Disconnect::ByApplication, "", "en")
                    .await;
            });
        }
    }
}
