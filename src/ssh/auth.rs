// ABOUTME: Credential types and the SSH user authentication step.
// ABOUTME: Supports passwords, private keys from a file or PEM text, and the SSH agent.

use super::client::SshHandler;
use super::error::{Error, Result};
use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, load_secret_key, ssh_key};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixStream;

/// Secret used to authenticate the user.
#[derive(Debug, Clone)]
pub enum Auth {
    Password(SecretString),
    PrivateKey {
        key: KeySource,
        passphrase: Option<SecretString>,
    },
    /// SSH agent, then the default key files under `~/.ssh`.
    Agent,
}

/// Where private key material comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    Path(PathBuf),
    /// OpenSSH or PEM encoded key text.
    Pem(SecretString),
}

impl KeySource {
    fn describe(&self) -> String {
        match self {
            KeySource::Path(path) => path.display().to_string(),
            KeySource::Pem(_) => "inline key".to_string(),
        }
    }
}

/// Authentication method resolved from the configured secret.
enum AuthMethod {
    Password(SecretString),
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// Authenticate `user` on a freshly connected session.
pub(crate) async fn authenticate(
    session: &mut Handle<SshHandler>,
    user: &str,
    auth: &Auth,
) -> Result<()> {
    let method = resolve_auth_method(auth).await?;
    let success = match method {
        AuthMethod::Password(password) => session
            .authenticate_password(user, password.expose_secret())
            .await
            .map_err(Error::Protocol)?
            .success(),
        AuthMethod::Agent(mut agent) => {
            let keys = agent.request_identities().await.map_err(|e| {
                Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
            })?;

            if keys.is_empty() {
                return Err(Error::AgentUnavailable("no keys in SSH agent".to_string()));
            }

            let mut accepted = false;
            for key in &keys {
                match session
                    .authenticate_publickey_with(user, key.clone(), None, &mut agent)
                    .await
                {
                    Ok(result) if result.success() => {
                        accepted = true;
                        break;
                    }
                    _ => continue,
                }
            }
            accepted
        }
        AuthMethod::KeyFile(key) => {
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(Error::Protocol)?
                .flatten();

            session
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                .await
                .map_err(Error::Protocol)?
                .success()
        }
    };

    if success {
        Ok(())
    } else {
        Err(Error::AuthenticationFailed)
    }
}

async fn resolve_auth_method(auth: &Auth) -> Result<AuthMethod> {
    match auth {
        Auth::Password(password) => Ok(AuthMethod::Password(password.clone())),
        Auth::PrivateKey { key, passphrase } => {
            let passphrase = passphrase.as_ref().map(|p| p.expose_secret().as_str());
            let loaded = load_key(key, passphrase)?;
            Ok(AuthMethod::KeyFile(Arc::new(loaded)))
        }
        Auth::Agent => resolve_agent_or_default_keys().await,
    }
}

/// Decode key material, reporting encrypted keys distinctly.
pub(crate) fn load_key(key: &KeySource, passphrase: Option<&str>) -> Result<ssh_key::PrivateKey> {
    let loaded = match key {
        KeySource::Path(path) => load_secret_key(path, passphrase),
        KeySource::Pem(pem) => decode_secret_key(pem.expose_secret().trim(), passphrase),
    };
    loaded.map_err(|e| match e {
        russh::keys::Error::KeyIsEncrypted => Error::KeyPassphraseRequired,
        other => Error::KeyLoadFailed {
            source_name: key.describe(),
            reason: other.to_string(),
        },
    })
}

async fn resolve_agent_or_default_keys() -> Result<AuthMethod> {
    if let Ok(agent) = AgentClient::connect_env().await {
        return Ok(AuthMethod::Agent(agent));
    }

    let home = std::env::var("HOME").map_err(|_| {
        Error::AgentUnavailable("SSH agent not available and HOME not set".to_string())
    })?;

    let default_keys = [
        format!("{}/.ssh/id_ed25519", home),
        format!("{}/.ssh/id_rsa", home),
        format!("{}/.ssh/id_ecdsa", home),
    ];

    for key_path in &default_keys {
        if let Ok(key) = load_secret_key(key_path, None) {
            tracing::debug!(key = %key_path, "using default key file");
            return Ok(AuthMethod::KeyFile(Arc::new(key)));
        }
    }

    Err(Error::AgentUnavailable(
        "SSH agent not available and no default keys found".to_string(),
    ))
}
