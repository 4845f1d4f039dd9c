//! Newline delimited JSON records, decoded one at a time

use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufRead, Read};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

use super::compression::Compression;
use super::error::ProtocolError;
use super::frame::{Job, JobFrame};

/// Frames buffered between the blocking decoder and the executor
const FRAME_BUFFER: usize = 4;

pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(record).map_err(ProtocolError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Encode a whole job as the byte stream an agent reads on stdin
pub fn encode_job(job: &Job, compression: Compression) -> Result<Vec<u8>, ProtocolError> {
    let mut data = Vec::new();
    for frame in job.frames() {
        data.extend(encode_record(&frame)?);
    }
    compression.compress(data)
}

/// Writes records, flushing after each one so the reader sees it immediately
pub struct RecordWriter<W> {
    inner: W,
    written: usize,
}

impl<W: AsyncWrite + Unpin> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub async fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), ProtocolError> {
        let line = encode_record(record)?;
        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Async record reader. Blank lines are ignored.
pub struct RecordReader<R> {
    inner: R,
    line: String,
    decoded: usize,
}

impl<R: AsyncBufRead + Unpin> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            decoded: 0,
        }
    }

    /// Next record, or `None` at end of stream
    pub async fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            if self.line.trim().is_empty() {
                continue;
            }
            self.decoded += 1;
            trace!("Decoding record {}", self.decoded);
            return serde_json::from_str(&self.line)
                .map(Some)
                .map_err(|source| ProtocolError::Decode {
                    record: self.decoded,
                    source,
                });
        }
    }
}

/// Blocking job frame reader
pub struct FrameReader<R> {
    inner: R,
    decoded: usize,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, decoded: 0 }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<JobFrame, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.inner.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.trim().is_empty() => continue,
                Ok(_) => break,
                Err(e) => return Some(Err(e.into())),
            }
        }
        self.decoded += 1;
        let record = self.decoded;
        Some(
            serde_json::from_str(&line).map_err(|source| ProtocolError::Decode { record, source }),
        )
    }
}

/// Decode frames from a blocking reader on a worker thread, handing each
/// frame over as soon as it is complete
pub fn spawn_frame_reader<R>(
    reader: R,
    compression: Compression,
) -> mpsc::Receiver<Result<JobFrame, ProtocolError>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::task::spawn_blocking(move || {
        let frames = match compression.reader(reader) {
            Ok(buffered) => FrameReader::new(buffered),
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        for frame in frames {
            let failed = frame.is_err();
            if tx.blocking_send(frame).is_err() || failed {
                break;
            }
        }
    });
    rx
}
