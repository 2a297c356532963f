use std::fmt;

use serde::{Deserialize, Serialize};

use super::format::AudioFormatDescriptor;

/// A four-character RIFF chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const RIFF: Self = Self(*b"RIFF");
    pub const RF64: Self = Self(*b"RF64");
    pub const WAVE: Self = Self(*b"WAVE");
    pub const FMT: Self = Self(*b"fmt ");
    pub const DATA: Self = Self(*b"data");
    pub const DS64: Self = Self(*b"ds64");
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{}\")", self)
    }
}

/// Location of a chunk's payload. The payload itself is never held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: FourCc,
    pub length: u32,
    /// Absolute stream offset of the first payload byte.
    pub offset: u64,
}

/// Location of the PCM payload inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpan {
    pub offset: u64,
    pub length: u64,
}

impl DataSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Result of parsing a RIFF/RF64 WAVE container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveContainer {
    pub format: AudioFormatDescriptor,
    pub data: DataSpan,
    /// Every chunk other than `fmt `, `data` and `ds64`, in file order.
    pub chunks: Vec<ChunkRecord>,
    pub is_rf64: bool,
}

impl WaveContainer {
    /// First inventory chunk with the given identifier.
    pub fn find_chunk(&self, id: FourCc) -> Option<&ChunkRecord> {
        self.chunks.iter().find(|c| c.id == id)
    }
}
