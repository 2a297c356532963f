//! WAV header generation.
//!
//! Produces a canonical `RIFF` / `fmt ` / `data` header for any
//! [`AudioFormatDescriptor`], and helpers for patching the size fields once the
//! amount of audio is known.

use crate::models::format::AudioFormatDescriptor;

/// Length of the header written for `format`, up to the first data byte.
pub fn header_len(format: &AudioFormatDescriptor) -> usize {
    let fmt_len = format.to_fmt_chunk().len();
    12 + 8 + fmt_len + (fmt_len & 1) + 8
}

/// Generate a WAV header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  fmt chunk length (16, 18 or 18 + cbSize)
/// [20-..]  fmt chunk body, padded to even length
/// [..]     "data"
/// [..]     data_size
/// ```
pub fn generate_header(format: &AudioFormatDescriptor, data_size: u32) -> Vec<u8> {
    let fmt = format.to_fmt_chunk();
    let len = header_len(format);
    let riff_size = (len as u32 - 8).saturating_add(data_size);

    let mut header = Vec::with_capacity(len);

    // RIFF chunk descriptor
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&riff_size.to_le_bytes());
    header.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    header.extend_from_slice(&fmt);
    if fmt.len() % 2 == 1 {
        header.push(0);
    }

    // data sub-chunk
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());

    header
}

/// Patch the RIFF size field at offset 4 (file size - 8).
pub fn patch_riff_size(header: &mut [u8], total_file_size: u64) {
    let riff_size = total_file_size.saturating_sub(8).min(u32::MAX as u64) as u32;
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
}

/// Patch the data size field, the last four bytes of the header.
pub fn patch_data_size(header: &mut [u8], data_size: u64) {
    let at = header.len() - 4;
    let data_size = data_size.min(u32::MAX as u64) as u32;
    header[at..].copy_from_slice(&data_size.to_le_bytes());
}
