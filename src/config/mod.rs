// ABOUTME: Host inventory loaded from fastssh.yml.
// ABOUTME: Handles YAML parsing, file discovery, and resolving a target to session settings.

mod env_value;
mod host;

pub use env_value::{EnvValue, resolve_env_map};
pub use host::HostConfig;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "fastssh.yml";
pub const CONFIG_FILENAME_ALT: &str = "fastssh.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".fastssh/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "deserialize_hosts")]
    pub hosts: HashMap<String, HostConfig>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn host(&self, name: &str) -> Result<&HostConfig> {
        self.hosts
            .get(name)
            .ok_or_else(|| Error::UnknownHost(name.to_string()))
    }

    /// Look `target` up by name, falling back to parsing it as `[user@]host[:port]`.
    pub fn resolve_target(&self, target: &str) -> Result<HostConfig> {
        if let Some(host) = self.hosts.get(target) {
            return Ok(host.clone());
        }
        HostConfig::parse(target).map_err(Error::InvalidTarget)
    }
}

fn deserialize_hosts<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, HostConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: HashMap<String, HostEntry> = HashMap::deserialize(deserializer)?;
    entries
        .into_iter()
        .map(|(name, entry)| {
            entry
                .into_host_config()
                .map(|config| (name.clone(), config))
                .map_err(|e| serde::de::Error::custom(format!("host {}: {}", name, e)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Simple(String),
    Detailed(HostConfig),
}

impl HostEntry {
    fn into_host_config(self) -> std::result::Result<HostConfig, String> {
        match self {
            HostEntry::Simple(s) => HostConfig::parse(&s),
            HostEntry::Detailed(c) => Ok(c),
        }
    }
}
