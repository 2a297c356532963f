use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::models::config::ParseMode;
use crate::models::container::{ChunkRecord, WaveContainer};
use crate::models::error::{IngestError, Result};
use crate::models::format::AudioFormatDescriptor;
use crate::processing::riff_reader;
use crate::traits::pcm_stream::PcmStream;

/// PCM stream over the data chunk of a RIFF/RF64 WAVE container.
///
/// The readable length is the declared data length, cut short when the underlying
/// stream ends earlier. Positions are relative to the start of the data chunk.
pub struct WaveFileReader<R> {
    reader: R,
    container: WaveContainer,
    length: u64,
    position: u64,
    // The inner reader is not at `data.offset + position`.
    needs_seek: bool,
}

impl WaveFileReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ParseMode::Tolerant)
    }

    pub fn open_with(path: impl AsRef<Path>, mode: ParseMode) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), mode)
    }
}

impl<R: Read + Seek> WaveFileReader<R> {
    /// Parse the container starting at the reader's current position.
    pub fn new(mut reader: R, mode: ParseMode) -> Result<Self> {
        let container = riff_reader::parse(&mut reader, mode)?;
        let end = reader.seek(SeekFrom::End(0))?;

        let span = container.data;
        let length = span.length.min(end.saturating_sub(span.offset));
        if length < span.length {
            log::warn!(
                "data chunk declares {} bytes but only {} are present",
                span.length,
                length
            );
        }

        Ok(Self {
            reader,
            container,
            length,
            position: 0,
            needs_seek: true,
        })
    }

    pub fn container(&self) -> &WaveContainer {
        &self.container
    }

    /// Read the payload of an inventory chunk. Does not disturb the PCM position.
    pub fn read_chunk(&mut self, chunk: &ChunkRecord) -> Result<Vec<u8>> {
        self.needs_seek = true;
        riff_reader::read_chunk(&mut self.reader, chunk)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn block_align(&self) -> u64 {
        self.container.format.block_align().max(1) as u64
    }
}

impl<R: Read + Seek + Send> PcmStream for WaveFileReader<R> {
    fn format(&self) -> AudioFormatDescriptor {
        self.container.format.clone()
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    /// Clamped to the length and aligned down to a frame boundary.
    fn set_position(&mut self, position: u64) -> Result<()> {
        let position = position.min(self.length);
        self.position = position - position % self.block_align();
        self.needs_seek = true;
        Ok(())
    }

    /// `buf.len()` must be a whole number of frames.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let align = self.block_align();
        if buf.len() as u64 % align != 0 {
            return Err(IngestError::InvalidArgument(format!(
                "read of {} bytes is not a multiple of the {} byte block",
                buf.len(),
                align
            )));
        }

        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        if self.needs_seek {
            self.reader
                .seek(SeekFrom::Start(self.container.data.offset + self.position))?;
            self.needs_seek = false;
        }

        let mut filled = 0;
        while filled < want {
            let n = self.reader.read(&mut buf[filled..want])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.position += filled as u64;
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::models::container::FourCc;
    use crate::processing::wav_format;

    fn wav(format: &AudioFormatDescriptor, payload: &[u8], trailing: &[u8]) -> Vec<u8> {
        let mut bytes = wav_format::generate_header(format, payload.len() as u32);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(trailing);
        let total = bytes.len() as u64;
        wav_format::patch_riff_size(&mut bytes, total);
        bytes
    }

    #[test]
    fn reads_the_data_chunk() {
        let format = AudioFormatDescriptor::pcm(8000, 16, 1);
        let payload: Vec<u8> = (0..20u8).collect();
        let mut reader = WaveFileReader::new(Cursor::new(wav(&format, &payload, &[])), ParseMode::Strict).unwrap();

        assert_eq!(reader.format(), format);
        assert_eq!(reader.length(), 20);

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, &payload[..8]);

        let mut rest = Vec::new();
        let mut chunk = [0u8; 6];
        loop {
            let n = reader.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(rest, &payload[8..]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn misaligned_read_is_rejected() {
        let format = AudioFormatDescriptor::pcm(8000, 16, 2);
        let mut reader = WaveFileReader::new(Cursor::new(wav(&format, &[0; 16], &[])), ParseMode::Tolerant).unwrap();

        let mut buf = [0u8; 6];
        assert!(matches!(reader.read(&mut buf), Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn position_is_clamped_and_aligned() {
        let format = AudioFormatDescriptor::pcm(8000, 16, 2);
        let payload: Vec<u8> = (0..16u8).collect();
        let mut reader = WaveFileReader::new(Cursor::new(wav(&format, &payload, &[])), ParseMode::Tolerant).unwrap();

        reader.set_position(7).unwrap();
        assert_eq!(reader.position(), 4);
        let mut buf = [0u8; 4];
        reader.read(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);

        reader.set_position(100).unwrap();
        assert_eq!(reader.position(), 16);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_file_is_readable_up_to_its_end() {
        let format = AudioFormatDescriptor::pcm(8000, 8, 1);
        let mut bytes = wav_format::generate_header(&format, 100);
        bytes.extend_from_slice(&[9u8; 10]);

        let mut reader = WaveFileReader::new(Cursor::new(bytes), ParseMode::Tolerant).unwrap();
        assert_eq!(reader.container().data.length, 100);
        assert_eq!(reader.length(), 10);

        let mut buf = [0u8; 32];
        assert_eq!(reader.read(&mut buf).unwrap(), 10);
    }

    #[test]
    fn chunks_can_be_read_between_pcm_reads() {
        let format = AudioFormatDescriptor::pcm(8000, 8, 1);
        let mut trailing = Vec::new();
        trailing.extend_from_slice(b"LIST");
        trailing.extend_from_slice(&4u32.to_le_bytes());
        trailing.extend_from_slice(b"INFO");
        let mut reader =
            WaveFileReader::new(Cursor::new(wav(&format, &[1, 2, 3, 4], &trailing)), ParseMode::Strict).unwrap();

        let mut buf = [0u8; 2];
        reader.read(&mut buf).unwrap();

        let list = *reader.container().find_chunk(FourCc(*b"LIST")).unwrap();
        assert_eq!(reader.read_chunk(&list).unwrap(), b"INFO");

        reader.read(&mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
    }

    #[test]
    fn open_reads_from_disk() {
        let path = std::env::temp_dir().join("pcm_ingest_test_reader_open.wav");
        let format = AudioFormatDescriptor::ieee_float(44100, 1);
        std::fs::write(&path, wav(&format, &[0u8; 8], &[])).unwrap();

        let reader = WaveFileReader::open(&path).unwrap();
        assert_eq!(reader.length(), 8);
        assert!(!reader.container().is_rf64);

        std::fs::remove_file(&path).ok();
    }
}
