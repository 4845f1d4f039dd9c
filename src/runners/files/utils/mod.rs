//! Filesystem primitives shared by the file runners: staged writes, content
//! digests, ownership and permission bits

use thiserror::Error;

pub mod atomic;
pub mod checksum;
pub mod ownership;
pub mod permissions;

pub use atomic::{atomic_write, StagedFile};
pub use checksum::{same_content, sha256_file, sha256_hex};
pub use ownership::*;
pub use permissions::{ensure_mode, get_mode, parse_mode, set_mode};

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Permission denied on {path}")]
    PermissionDenied { path: String },

    #[error("Not a usable file path: {path}")]
    InvalidPath { path: String },

    #[error("Mode '{mode}' is not an octal permission value")]
    InvalidPermissions { mode: String },

    #[error("Cannot change ownership of {path}: {reason}")]
    Ownership { path: String, reason: String },

    #[error(transparent)]
    Io {
        #[from]
        source: std::io::Error,
    },
}
