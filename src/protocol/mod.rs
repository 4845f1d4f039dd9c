//! Wire protocol between controller and agent
//!
//! The controller sends a header frame with job vars followed by one frame
//! per play, optionally zstd compressed. The agent answers with one task
//! result per line, flushed as each task finishes.

pub mod codec;
pub mod compression;
pub mod error;
pub mod frame;

pub use codec::{
    encode_job, encode_record, spawn_frame_reader, FrameReader, RecordReader, RecordWriter,
};
pub use compression::Compression;
pub use error::ProtocolError;
pub use frame::{Job, JobFrame};
