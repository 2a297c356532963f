use crate::models::error::Result;
use crate::models::format::AudioFormatDescriptor;

/// A position-addressable stream of PCM bytes.
///
/// Implemented by container readers, in-memory buffers and the mixer bus, so any of
/// them can feed any other. Positions and lengths are in bytes.
pub trait PcmStream: Send {
    fn format(&self) -> AudioFormatDescriptor;

    /// Total readable bytes.
    fn length(&self) -> u64;

    fn position(&self) -> u64;

    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes, returning how many were read. Zero means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn remaining(&self) -> u64 {
        self.length().saturating_sub(self.position())
    }
}
