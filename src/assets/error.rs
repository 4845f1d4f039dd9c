use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{format} content in {path} but no key configured ({hint})")]
    MissingKey {
        format: String,
        path: String,
        hint: String,
    },

    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decryption of {path} with {command} failed: {stderr}")]
    DecryptFailed {
        command: String,
        path: String,
        stderr: String,
    },
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset source {path} is not a directory")]
    NotADirectory { path: String },

    #[error("Cannot walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Asset {name} was not loaded before execution")]
    NotLoaded { name: String },

    #[error("Asset payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Vault(#[from] VaultError),
}
