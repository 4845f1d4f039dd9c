//! SHA-256 digests used for change detection

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::FileError;

const READ_CHUNK: usize = 64 * 1024;

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Lowercase hex SHA-256 of the file at `path`, streamed in chunks
pub async fn sha256_file(path: &Path) -> Result<String, FileError> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::with_capacity(READ_CHUNK, file);
    let mut hasher = Sha256::new();

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
        let consumed = chunk.len();
        reader.consume(consumed);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// True when the file at `path` holds exactly `data`. A size mismatch
/// answers without hashing.
pub async fn same_content(path: &Path, data: &[u8]) -> Result<bool, FileError> {
    if tokio::fs::metadata(path).await?.len() != data.len() as u64 {
        return Ok(false);
    }
    Ok(sha256_file(path).await? == sha256_hex(data))
}
