use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Malformed playbook document: {reason}")]
    Malformed { reason: String },

    #[error("Single task cannot have multiple runners ({first} and {second})")]
    DuplicateRunner { first: String, second: String },

    #[error("Task has no runner, expected one of: {known}")]
    MissingRunner { known: String },

    #[error("Unexpected type for {field}: expected {expected}, got {actual}")]
    UnexpectedType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid task in play '{play}': {reason}")]
    InvalidTask { play: String, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
