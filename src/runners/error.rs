use thiserror::Error;

use crate::assets::{AssetError, VaultError};
use crate::runners::files::utils::FileError;
use crate::runners::template_engine::TemplateError;

/// Errors raised inside a runner body. The dispatcher turns every one of them
/// into a failed task result.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Missing required argument '{arg}' for runner {runner}")]
    MissingArgument { runner: String, arg: String },

    #[error("Invalid argument {arg}: {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("Runner {runner} has no {phase} phase")]
    Unsupported { runner: String, phase: String },

    #[error("Destination {path} does not exist")]
    DestinationMissing { path: String },

    #[error("Cannot overwrite {path} with a {expected}")]
    PathConflict { path: String, expected: String },

    #[error("Unknown user: {name}")]
    UnknownUser { name: String },

    #[error("Unknown group: {name}")]
    UnknownGroup { name: String },

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("{operation} failed on {path}: {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Invalid command line: {0}")]
    CommandLine(#[from] shell_words::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    pub fn io(operation: &str, path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        RunnerError::Io {
            operation: operation.to_string(),
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn missing(runner: &str, arg: &str) -> Self {
        RunnerError::MissingArgument {
            runner: runner.to_string(),
            arg: arg.to_string(),
        }
    }
}
