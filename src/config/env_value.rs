// ABOUTME: Host settings that may be written inline or taken from the caller's environment.
// ABOUTME: Lets fastssh.yml name a variable instead of storing passwords and passphrases.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

/// A config value given inline (`password: hunter2`) or by variable
/// (`password: { env: PI_PASSWORD, default: raspberry }`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// The value, read at connect time so a running shell's exports apply.
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(value) => Ok(value.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }

    /// Resolve a password or key passphrase without leaving a plain `String` around.
    pub fn resolve_secret(&self) -> Result<SecretString> {
        self.resolve().map(SecretString::new)
    }
}

/// Resolve every value, sorted by name so channel setup order is stable.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<Vec<(String, String)>> {
    let mut resolved = map
        .iter()
        .map(|(k, v)| v.resolve().map(|value| (k.clone(), value)))
        .collect::<Result<Vec<_>>>()?;
    resolved.sort();
    Ok(resolved)
}
