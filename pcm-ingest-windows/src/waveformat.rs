//! Conversions between [`AudioFormatDescriptor`] and `WAVEFORMATEX` memory.

use std::ptr::addr_of;

use windows::Win32::Media::Audio::WAVEFORMATEX;

use pcm_ingest_core::models::error::{IngestError, Result};
use pcm_ingest_core::models::format::AudioFormatDescriptor;

/// Size of `WAVEFORMATEX` up to and including `cbSize`.
const WAVEFORMATEX_LEN: usize = 18;

/// `WAVEFORMATEX` bytes for a descriptor, `cbSize` always present.
///
/// The buffer has alignment 1, which the packed Windows struct accepts.
pub(crate) fn to_waveformatex(format: &AudioFormatDescriptor) -> Vec<u8> {
    let mut bytes = format.to_fmt_chunk();
    if bytes.len() < WAVEFORMATEX_LEN {
        bytes.resize(WAVEFORMATEX_LEN, 0);
    }
    bytes
}

/// Parse a `WAVEFORMATEX` (or `WAVEFORMATEXTENSIBLE`) returned by the system.
///
/// # Safety
/// `ptr` must point to a valid `WAVEFORMATEX` followed by `cbSize` extra bytes.
pub(crate) unsafe fn from_waveformatex(ptr: *const WAVEFORMATEX) -> Result<AudioFormatDescriptor> {
    if ptr.is_null() {
        return Err(IngestError::DeviceFailure("device returned no format".into()));
    }
    let extra = addr_of!((*ptr).cbSize).read_unaligned() as usize;
    let bytes = std::slice::from_raw_parts(ptr as *const u8, WAVEFORMATEX_LEN + extra);
    AudioFormatDescriptor::from_fmt_chunk(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcm_ingest_core::models::format::WaveEncoding;

    #[test]
    fn plain_pcm_gains_cb_size() {
        let bytes = to_waveformatex(&AudioFormatDescriptor::pcm(44100, 16, 2));
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[16..], &[0, 0]);
    }

    #[test]
    fn extensible_survives_the_struct() {
        let format = AudioFormatDescriptor::extensible(48000, 32, 2, WaveEncoding::IeeeFloat);
        let bytes = to_waveformatex(&format);
        let parsed = unsafe { from_waveformatex(bytes.as_ptr() as *const WAVEFORMATEX) }.unwrap();
        assert_eq!(parsed, format);
    }
}
