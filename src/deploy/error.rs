use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid host spec '{spec}': expected [user@]host[:port]")]
    InvalidHostSpec { spec: String },

    #[error("Cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command on {host} failed ({status}): {command}\n{stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Upload of {path} to {host} failed: {reason}")]
    Upload {
        host: String,
        path: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cannot determine remote platform from '{output}'")]
    UnknownPlatform { output: String },

    #[error("No agent binary for {platform} (looked for {path})")]
    AgentMissing { platform: String, path: String },

    #[error("Agent on {host} exited with {status}: {stderr}")]
    AgentExit {
        host: String,
        status: String,
        stderr: String,
    },

    #[error("Host task for {host} aborted: {reason}")]
    Aborted { host: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
