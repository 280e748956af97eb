// ABOUTME: Per-host connection settings from the config file or a command-line target.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use super::env_value::{EnvValue, resolve_env_map};
use crate::error::Result;
use crate::ssh::{Auth, KeySource, SessionConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<EnvValue>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub key_passphrase: Option<EnvValue>,
    #[serde(default = "default_trust_on_first_use")]
    pub trust_on_first_use: bool,
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

fn default_port() -> u16 {
    22
}

fn default_trust_on_first_use() -> bool {
    true
}

impl HostConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: None,
            password: None,
            key_path: None,
            key_passphrase: None,
            trust_on_first_use: default_trust_on_first_use(),
            known_hosts_path: None,
            connect_timeout: None,
            command_timeout: None,
            env: HashMap::new(),
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host address cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = if let Some(at_pos) = s.find('@') {
            (Some(&s[..at_pos]), &s[at_pos + 1..])
        } else {
            (None, s)
        };

        if user_part.is_some_and(str::is_empty) {
            return Err("username cannot be empty".to_string());
        }

        let (host, port) = if let Some(colon_pos) = rest.rfind(':') {
            let port_str = &rest[colon_pos + 1..];
            let port = port_str
                .parse::<u16>()
                .map_err(|_| format!("invalid port: {}", port_str))?;
            (&rest[..colon_pos], port)
        } else {
            (rest, 22)
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        let mut config = HostConfig::new(host);
        config.port = port;
        config.user = user_part.map(|s| s.to_string());
        Ok(config)
    }

    /// Build session settings, reading secrets from the environment where configured.
    ///
    /// `fallback_user` is used when the entry names no user. A key path wins
    /// over a password; with neither, the SSH agent is used.
    pub fn session_config(&self, fallback_user: &str) -> Result<SessionConfig> {
        let user = self.user.as_deref().unwrap_or(fallback_user);

        let auth = if let Some(path) = &self.key_path {
            Auth::PrivateKey {
                key: KeySource::Path(expand_home(path)),
                passphrase: self
                    .key_passphrase
                    .as_ref()
                    .map(EnvValue::resolve_secret)
                    .transpose()?,
            }
        } else if let Some(password) = &self.password {
            Auth::Password(password.resolve_secret()?)
        } else {
            Auth::Agent
        };

        let mut config = SessionConfig::new(&self.host, user)
            .port(self.port)
            .auth(auth)
            .trust_on_first_use(self.trust_on_first_use);

        if let Some(path) = &self.known_hosts_path {
            config = config.known_hosts_path(expand_home(path));
        }
        if let Some(timeout) = self.connect_timeout {
            config = config.connect_timeout(timeout);
        }
        if let Some(timeout) = self.command_timeout {
            config = config.command_timeout(timeout);
        }
        config.env = resolve_env_map(&self.env)?;

        Ok(config)
    }
}

/// Expand a leading `~/` using HOME.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
