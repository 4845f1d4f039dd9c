//! Transport abstraction: how the controller reaches a host

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use tokio::io::AsyncRead;

use super::error::TransportError;

/// `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostSpec {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl FromStr for HostSpec {
    type Err = TransportError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidHostSpec {
            spec: spec.to_string(),
        };

        let (user, rest) = match spec.trim().split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid()),
            None => (None, spec.trim()),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (rest, None),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// How a streamed remote command ended
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub success: bool,
    pub status: String,
    pub stderr: String,
}

/// A remote command whose stdout is read while it runs
pub struct RemoteProcess {
    pub stdout: Pin<Box<dyn AsyncRead + Send>>,
    /// Resolves once the command has exited; await after draining stdout
    pub completion: BoxFuture<'static, Result<ExitReport, TransportError>>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Connection>, TransportError>;

    /// Whether hosts reached through this transport need the agent binary
    /// installed before a job can run
    fn requires_agent_install(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait Connection: Send + Sync {
    fn host(&self) -> &str;

    /// Run a shell command and collect its output
    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Write `data` to `remote_path` with permission bits `mode`
    async fn upload_bytes(&self, data: &[u8], remote_path: &str, mode: u32)
        -> Result<(), TransportError>;

    /// Start `command` with `stdin` as its standard input
    async fn stream_exec(&self, command: &str, stdin: Vec<u8>)
        -> Result<RemoteProcess, TransportError>;

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
