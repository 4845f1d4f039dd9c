use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Pre-run of {task} failed: {output}")]
    PreRunFailed { task: String, output: String },

    #[error("Controller command '{command}' failed: {output}")]
    ControllerCommand { command: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
