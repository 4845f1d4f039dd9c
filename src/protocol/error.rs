use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode record {record}: {source}")]
    Decode {
        record: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected {expected} frame, got {found}")]
    UnexpectedFrame { expected: String, found: String },

    #[error("Unknown compression '{0}' (expected none or zstd)")]
    UnknownCompression(String),

    #[error("Stream ended before the job header")]
    MissingHeader,

    #[error("Stream IO error: {0}")]
    Io(#[from] std::io::Error),
}
