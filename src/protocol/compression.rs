//! Optional compression of the controller to agent stream

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

use super::error::ProtocolError;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zstd,
}

impl Compression {
    pub fn compress(self, data: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Compression::None => Ok(data),
            Compression::Zstd => Ok(zstd::stream::encode_all(data.as_slice(), ZSTD_LEVEL)?),
        }
    }

    /// Wrap `reader` so that reads yield decompressed bytes
    pub fn reader<'a, R: Read + Send + 'a>(
        self,
        reader: R,
    ) -> Result<Box<dyn BufRead + Send + 'a>, ProtocolError> {
        match self {
            Compression::None => Ok(Box::new(BufReader::new(reader))),
            Compression::Zstd => Ok(Box::new(BufReader::new(zstd::stream::read::Decoder::new(
                reader,
            )?))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("none"),
            Compression::Zstd => f.write_str("zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Compression::None),
            "zstd" => Ok(Compression::Zstd),
            other => Err(ProtocolError::UnknownCompression(other.to_string())),
        }
    }
}
