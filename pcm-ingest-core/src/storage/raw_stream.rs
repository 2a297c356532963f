use crate::models::error::Result;
use crate::models::format::AudioFormatDescriptor;
use crate::traits::pcm_stream::PcmStream;

/// In-memory PCM bytes with a format, for generated or captured audio.
#[derive(Debug, Clone)]
pub struct RawPcmStream {
    format: AudioFormatDescriptor,
    data: Vec<u8>,
    position: u64,
}

impl RawPcmStream {
    pub fn new(format: AudioFormatDescriptor, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            position: 0,
        }
    }

    /// 32-bit float stream from interleaved samples.
    pub fn from_f32(sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(AudioFormatDescriptor::ieee_float(sample_rate, channels), data)
    }
}

impl PcmStream for RawPcmStream {
    fn format(&self) -> AudioFormatDescriptor {
        self.format.clone()
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    /// Clamped to the length and aligned down to a frame boundary.
    fn set_position(&mut self, position: u64) -> Result<()> {
        let align = self.format.block_align().max(1) as u64;
        let position = position.min(self.length());
        self.position = position - position % align;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = self.position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}
