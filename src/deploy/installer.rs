//! Keeps the remote agent binary in sync with the local build for the
//! remote's platform

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{DeployError, TransportError};
use super::platform::Platform;
use super::transport::Connection;
use crate::runners::files::utils::sha256_hex;

pub const AGENT_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
pub struct AgentInstaller {
    agent_dir: PathBuf,
    remote_path: String,
}

/// What a single probe round-trip learned about the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAgentState {
    pub platform: Platform,
    pub checksum: Option<String>,
}

impl RemoteAgentState {
    /// Parse `uname -sm` on the first line, optionally followed by a
    /// `sha256sum` line for the installed agent
    pub fn parse(output: &str) -> Result<Self, DeployError> {
        let mut lines = output.lines().filter(|l| !l.trim().is_empty());
        let platform = Platform::from_uname(lines.next().unwrap_or_default())?;
        let checksum = lines
            .next()
            .and_then(|line| line.split_whitespace().next())
            .filter(|hash| hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_lowercase);
        Ok(Self { platform, checksum })
    }
}

impl AgentInstaller {
    pub fn new(agent_dir: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            agent_dir: agent_dir.into(),
            remote_path: remote_path.into(),
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Upload the agent when the remote copy is missing or differs.
    /// Returns whether an upload happened.
    pub async fn ensure(&self, connection: &dyn Connection) -> Result<bool, DeployError> {
        let quoted = shell_words::quote(&self.remote_path);
        let probe = format!("uname -sm; sha256sum {quoted} 2>/dev/null || true");
        let output = connection.run(&probe).await?;
        if !output.success {
            return Err(TransportError::CommandFailed {
                host: connection.host().to_string(),
                command: probe,
                status: output.status,
                stderr: output.stderr,
            }
            .into());
        }

        let state = RemoteAgentState::parse(&output.stdout)?;
        let local_path = self.local_agent(&state.platform)?;
        let binary = tokio::fs::read(&local_path).await?;
        let local_checksum = sha256_hex(&binary);

        if state.checksum.as_deref() == Some(local_checksum.as_str()) {
            debug!(
                "Agent on {} is current ({})",
                connection.host(),
                state.platform
            );
            return Ok(false);
        }

        info!(
            "Uploading agent {} to {}:{}",
            local_path.display(),
            connection.host(),
            self.remote_path
        );
        connection
            .upload_bytes(&binary, &self.remote_path, AGENT_MODE)
            .await?;
        Ok(true)
    }

    /// Local agent binary for `platform`. When the agent directory has none
    /// and the remote matches the controller, the `rustle-agent` installed
    /// next to the running executable is used.
    pub fn local_agent(&self, platform: &Platform) -> Result<PathBuf, DeployError> {
        let candidate = self.agent_dir.join(platform.agent_file_name());
        if candidate.is_file() {
            return Ok(candidate);
        }

        if *platform == Platform::current() {
            if let Some(sibling) = sibling_agent().filter(|p| p.is_file()) {
                return Ok(sibling);
            }
        }

        Err(DeployError::AgentMissing {
            platform: platform.to_string(),
            path: candidate.display().to_string(),
        })
    }
}

fn sibling_agent() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir: &Path| dir.join("rustle-agent"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_parse_probe_with_agent() {
        let output = format!("Linux amd64\n{HASH}  .cache/rustle/agent\n");
        let state = RemoteAgentState::parse(&output).unwrap();
        assert_eq!(state.platform, Platform::new("linux", "x86_64"));
        assert_eq!(state.checksum.as_deref(), Some(HASH));
    }

    #[test]
    fn test_parse_probe_without_agent() {
        let state = RemoteAgentState::parse("Linux aarch64\n").unwrap();
        assert_eq!(state.checksum, None);
        assert!(RemoteAgentState::parse("").is_err());
    }

    #[test]
    fn test_local_agent_lookup() {
        let dir = TempDir::new().unwrap();
        let platform = Platform::new("plan9", "mips");
        let installer = AgentInstaller::new(dir.path(), ".cache/rustle/agent");

        let err = installer.local_agent(&platform).unwrap_err();
        assert!(matches!(err, DeployError::AgentMissing { .. }));

        let path = dir.path().join("rustle-agent-plan9-mips");
        std::fs::write(&path, b"agent").unwrap();
        assert_eq!(installer.local_agent(&platform).unwrap(), path);
    }
}
