use std::fmt;

use thiserror::Error;

/// Which structural check on the RIFF header failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFault {
    /// The stream does not start with `RIFF` or `RF64`.
    NoRiffHeader,
    /// The RIFF form type is not `WAVE`.
    NotWave,
    /// The `fmt ` chunk is too short or absurdly long to describe a format.
    BadFormatChunk,
}

impl fmt::Display for FormatFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoRiffHeader => "no RIFF header",
            Self::NotWave => "not a WAVE file",
            Self::BadFormatChunk => "invalid format chunk",
        })
    }
}

/// A chunk the container must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Ds64,
    Format,
    Data,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ds64 => "ds64",
            Self::Format => "fmt",
            Self::Data => "data",
        })
    }
}

/// Errors raised while parsing containers, driving capture devices or mixing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("format error: {0}")]
    Format(FormatFault),

    #[error("missing {0} chunk")]
    MissingChunk(ChunkKind),

    #[error("corrupt chunk '{id}' at offset {offset}: declared {declared} bytes, {available} available")]
    CorruptChunk {
        id: String,
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("device failure: {0}")]
    DeviceFailure(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
