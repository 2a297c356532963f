use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{FormatFault, IngestError, Result};

/// Minimum length of a `fmt ` chunk (the classic `WAVEFORMAT` + bit depth).
pub const FMT_CHUNK_MIN_LEN: usize = 16;

/// Length of the extension carried by `WAVE_FORMAT_EXTENSIBLE`.
const EXTENSIBLE_EXTRA_LEN: usize = 22;

/// Trailing 14 bytes shared by every `KSDATAFORMAT_SUBTYPE_*` GUID
/// (`xxxxxxxx-0000-0010-8000-00aa00389b71`) in on-disk byte order.
const SUBTYPE_GUID_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Encoding tag of a wave format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum WaveEncoding {
    Pcm,
    IeeeFloat,
    ALaw,
    MuLaw,
    Extensible,
    Other(u16),
}

impl WaveEncoding {
    pub fn tag(self) -> u16 {
        match self {
            Self::Pcm => 0x0001,
            Self::IeeeFloat => 0x0003,
            Self::ALaw => 0x0006,
            Self::MuLaw => 0x0007,
            Self::Extensible => 0xFFFE,
            Self::Other(tag) => tag,
        }
    }
}

impl From<u16> for WaveEncoding {
    fn from(tag: u16) -> Self {
        match tag {
            0x0001 => Self::Pcm,
            0x0003 => Self::IeeeFloat,
            0x0006 => Self::ALaw,
            0x0007 => Self::MuLaw,
            0xFFFE => Self::Extensible,
            other => Self::Other(other),
        }
    }
}

impl From<WaveEncoding> for u16 {
    fn from(encoding: WaveEncoding) -> Self {
        encoding.tag()
    }
}

/// Immutable description of a PCM stream's encoding.
///
/// Field values are kept exactly as declared by the producer (a `fmt ` chunk or a
/// device mix format); nothing is recomputed after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormatDescriptor {
    encoding: WaveEncoding,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    block_align: u16,
    average_bytes_per_second: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extra: Vec<u8>,
}

impl AudioFormatDescriptor {
    /// Integer PCM at the given rate, bit depth and channel count.
    pub fn pcm(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self::packed(WaveEncoding::Pcm, sample_rate, bits_per_sample, channels)
    }

    /// 32-bit IEEE float at the given rate and channel count.
    pub fn ieee_float(sample_rate: u32, channels: u16) -> Self {
        Self::packed(WaveEncoding::IeeeFloat, sample_rate, 32, channels)
    }

    /// `WAVE_FORMAT_EXTENSIBLE` wrapping `sub_format` with the default speaker mask.
    pub fn extensible(sample_rate: u32, bits_per_sample: u16, channels: u16, sub_format: WaveEncoding) -> Self {
        let mut extra = Vec::with_capacity(EXTENSIBLE_EXTRA_LEN);
        extra.extend_from_slice(&bits_per_sample.to_le_bytes());
        extra.extend_from_slice(&default_channel_mask(channels).to_le_bytes());
        extra.extend_from_slice(&(sub_format.tag() as u32).to_le_bytes()[..2]);
        extra.extend_from_slice(&SUBTYPE_GUID_TAIL);

        Self {
            extra,
            ..Self::packed(WaveEncoding::Extensible, sample_rate, bits_per_sample, channels)
        }
    }

    fn packed(encoding: WaveEncoding, sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        Self {
            encoding,
            channels,
            sample_rate,
            bits_per_sample,
            block_align,
            average_bytes_per_second: sample_rate * block_align as u32,
            extra: Vec::new(),
        }
    }

    /// Parse the body of a `fmt ` chunk.
    ///
    /// The chunk length drives parsing: everything past the 18-byte `WAVEFORMATEX`
    /// prefix is kept as extra bytes, even when `cbSize` disagrees with it.
    pub fn from_fmt_chunk(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FMT_CHUNK_MIN_LEN {
            return Err(IngestError::Format(FormatFault::BadFormatChunk));
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let extra = if bytes.len() > 18 {
            let declared = u16_at(16) as usize;
            if declared != bytes.len() - 18 {
                log::debug!(
                    "fmt chunk cbSize {} disagrees with chunk length {}, trusting the chunk",
                    declared,
                    bytes.len()
                );
            }
            bytes[18..].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            encoding: WaveEncoding::from(u16_at(0)),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            average_bytes_per_second: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
            extra,
        })
    }

    /// Serialize as a `fmt ` chunk body.
    ///
    /// Plain PCM without extra bytes uses the 16-byte layout; everything else carries `cbSize`.
    pub fn to_fmt_chunk(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.extra.len());
        out.extend_from_slice(&self.encoding.tag().to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.average_bytes_per_second.to_le_bytes());
        out.extend_from_slice(&self.block_align.to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        if self.encoding != WaveEncoding::Pcm || !self.extra.is_empty() {
            out.extend_from_slice(&(self.extra.len() as u16).to_le_bytes());
            out.extend_from_slice(&self.extra);
        }
        out
    }

    pub fn encoding(&self) -> WaveEncoding {
        self.encoding
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    pub fn average_bytes_per_second(&self) -> u32 {
        self.average_bytes_per_second
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    /// Whether samples are 32-bit IEEE floats in a plain (non-extensible) descriptor.
    pub fn is_ieee_float_32(&self) -> bool {
        self.encoding == WaveEncoding::IeeeFloat && self.bits_per_sample == 32
    }

    /// Valid bits per sample of an extensible descriptor.
    pub fn valid_bits_per_sample(&self) -> Option<u16> {
        self.extensible_extra().map(|x| u16::from_le_bytes([x[0], x[1]]))
    }

    /// Speaker mask of an extensible descriptor.
    pub fn channel_mask(&self) -> Option<u32> {
        self.extensible_extra().map(|x| u32::from_le_bytes([x[2], x[3], x[4], x[5]]))
    }

    /// Sub-format of an extensible descriptor, if it is one of the `KSDATAFORMAT_SUBTYPE_*` GUIDs.
    pub fn sub_format(&self) -> Option<WaveEncoding> {
        let x = self.extensible_extra()?;
        if x[8..22] != SUBTYPE_GUID_TAIL {
            return None;
        }
        Some(WaveEncoding::from(u16::from_le_bytes([x[6], x[7]])))
    }

    fn extensible_extra(&self) -> Option<&[u8]> {
        (self.encoding == WaveEncoding::Extensible && self.extra.len() >= EXTENSIBLE_EXTRA_LEN)
            .then_some(&self.extra[..EXTENSIBLE_EXTRA_LEN])
    }

    /// Reduce an extensible descriptor to the equivalent plain one.
    ///
    /// Returns `None` when the extension carries information a plain descriptor cannot
    /// express: a non-default speaker mask, padded samples, more than two channels, or a
    /// sub-format outside PCM and IEEE float.
    pub fn to_standard(&self) -> Option<Self> {
        let sub_format = self.sub_format()?;
        if !matches!(sub_format, WaveEncoding::Pcm | WaveEncoding::IeeeFloat) {
            return None;
        }
        if self.channels == 0 || self.channels > 2 {
            return None;
        }
        let mask = self.channel_mask()?;
        if mask != 0 && mask != default_channel_mask(self.channels) {
            return None;
        }
        let valid_bits = self.valid_bits_per_sample()?;
        if valid_bits != 0 && valid_bits != self.bits_per_sample {
            return None;
        }

        Some(Self {
            encoding: sub_format,
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            block_align: self.block_align,
            average_bytes_per_second: self.average_bytes_per_second,
            extra: Vec::new(),
        })
    }

    /// Bytes needed to hold `duration` of audio, rounded down to whole frames.
    pub fn bytes_for_duration(&self, duration: Duration) -> usize {
        let bytes = self.average_bytes_per_second as u128 * duration.as_millis() / 1000;
        let align = self.block_align.max(1) as u128;
        (bytes - bytes % align) as usize
    }

    /// Playback time represented by `bytes` of audio.
    pub fn duration_of(&self, bytes: u64) -> Duration {
        if self.average_bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / self.average_bytes_per_second as f64)
    }
}

/// Default `SPEAKER_*` mask for a channel count.
fn default_channel_mask(channels: u16) -> u32 {
    match channels {
        1 => 0x4,
        2 => 0x3,
        n if n < 32 => (1u32 << n) - 1,
        _ => 0,
    }
}
