//! Controller configuration: built-in defaults, overlaid by a YAML file,
//! overlaid by command line flags

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::assets::Vault;
use crate::deploy::SshSettings;
use crate::protocol::Compression;

/// Looked up next to the playbook when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "rustle.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub agent: AgentConfig,
    pub compression: Compression,
    pub ssh: SshConfig,
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Holds one `rustle-agent-<os>-<arch>` binary per supported platform
    pub dir: PathBuf,
    /// Relative paths are resolved from the remote user's home
    pub remote_path: String,
    pub install: bool,
    pub sudo: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./agents"),
            remote_path: ".cache/rustle/agent".to_string(),
            install: true,
            sudo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    pub connect_timeout: u64,
    pub options: Vec<String>,
    pub binary: String,
    pub scp_binary: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        let settings = SshSettings::default();
        Self {
            connect_timeout: settings.connect_timeout,
            options: settings.options,
            binary: settings.binary,
            scp_binary: settings.scp_binary,
        }
    }
}

impl From<&SshConfig> for SshSettings {
    fn from(config: &SshConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            scp_binary: config.scp_binary.clone(),
            connect_timeout: config.connect_timeout,
            options: config.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// age identity file handed to `age --decrypt -i`
    pub age_identity: Option<PathBuf>,
    /// Password file handed to `ansible-vault view --vault-password-file`
    pub password_file: Option<PathBuf>,
}

impl VaultConfig {
    pub fn build(&self) -> Vault {
        Vault::with_keys(self.age_identity.clone(), self.password_file.clone())
    }
}

impl ControllerConfig {
    /// Load `explicit` if given, else `rustle.yml` beside the playbook if it
    /// exists, else the defaults
    pub fn load(explicit: Option<&Path>, playbook: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let beside = playbook
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_CONFIG_FILE);
        if beside.is_file() {
            return Self::from_file(&beside);
        }
        debug!("No {} next to {}, using defaults", DEFAULT_CONFIG_FILE, playbook.display());
        Ok(Self::default())
    }

    /// Parse a config file. Relative local paths in it are resolved from the
    /// file's own directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn rebase(&mut self, dir: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        join(&mut self.agent.dir);
        if let Some(p) = self.vault.age_identity.as_mut() {
            join(p);
        }
        if let Some(p) = self.vault.password_file.as_mut() {
            join(p);
        }
    }
}
