//! RIFF / RF64 WAVE container parser.
//!
//! Walks the chunk list of a container and records where things are. The `data`
//! payload and unknown chunks are skipped with seeks, so memory use does not depend
//! on file size.

use std::io::{self, Read, Seek, SeekFrom};

use crate::models::config::ParseMode;
use crate::models::container::{ChunkRecord, DataSpan, FourCc, WaveContainer};
use crate::models::error::{ChunkKind, FormatFault, IngestError, Result};
use crate::models::format::AudioFormatDescriptor;

/// Fixed part of a `ds64` chunk: RIFF size, data size, sample count.
const DS64_FIXED_LEN: u32 = 24;

/// Parse the container starting at the stream's current position.
///
/// All recorded offsets are absolute stream positions. On failure nothing is
/// returned; the stream position is unspecified.
pub fn parse<R: Read + Seek>(stream: &mut R, mode: ParseMode) -> Result<WaveContainer> {
    let start = stream.stream_position()?;
    let stream_len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(start))?;

    let tag = match read_fourcc(stream) {
        Ok(tag) => tag,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(IngestError::Format(FormatFault::NoRiffHeader))
        }
        Err(e) => return Err(e.into()),
    };
    let is_rf64 = match tag {
        FourCc::RIFF => false,
        FourCc::RF64 => true,
        _ => return Err(IngestError::Format(FormatFault::NoRiffHeader)),
    };

    let mut riff_size = match read_u32(stream) {
        Ok(size) => size as u64,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(IngestError::Format(FormatFault::NoRiffHeader))
        }
        Err(e) => return Err(e.into()),
    };
    if read_fourcc(stream).ok() != Some(FourCc::WAVE) {
        return Err(IngestError::Format(FormatFault::NotWave));
    }

    let mut ds64_data_size = 0u64;
    if is_rf64 {
        let ds64 = read_ds64(stream).map_err(|e| match e {
            IngestError::Io(_) => IngestError::MissingChunk(ChunkKind::Ds64),
            other => other,
        })?;
        riff_size = ds64.riff_size;
        ds64_data_size = ds64.data_size;
    }

    let stop = start.saturating_add(riff_size).saturating_add(8).min(stream_len);
    let mut pos = stream.stream_position()?;

    let mut format: Option<AudioFormatDescriptor> = None;
    let mut data: Option<DataSpan> = None;
    let mut chunks = Vec::new();

    while pos + 8 <= stop {
        let id = read_fourcc(stream)?;
        let declared = read_u32(stream)?;
        let offset = pos + 8;
        let available = stream_len - offset;

        let payload_len = match id {
            FourCc::DATA => {
                let length = if is_rf64 { ds64_data_size } else { declared as u64 };
                if length > available {
                    check_overrun(mode, id, offset, length, available)?;
                    log::warn!(
                        "data chunk declares {} bytes but only {} remain, file is truncated",
                        length,
                        available
                    );
                }
                if data.is_none() {
                    data = Some(DataSpan { offset, length });
                } else {
                    log::debug!("ignoring extra data chunk at offset {}", offset);
                }
                length
            }
            FourCc::FMT => {
                if declared > i32::MAX as u32 {
                    return Err(IngestError::Format(FormatFault::BadFormatChunk));
                }
                if declared as u64 > available {
                    check_overrun(mode, id, offset, declared as u64, available)?;
                    log::warn!("fmt chunk at offset {} runs past end of stream, stopping", offset);
                    break;
                }
                let mut body = vec![0u8; declared as usize];
                stream.read_exact(&mut body)?;
                if format.is_none() {
                    format = Some(AudioFormatDescriptor::from_fmt_chunk(&body)?);
                } else {
                    log::debug!("ignoring extra fmt chunk at offset {}", offset);
                }
                declared as u64
            }
            _ => {
                // Lengths past i32::MAX are negative to 32-bit signed readers.
                if declared > i32::MAX as u32 || declared as u64 > available {
                    check_overrun(mode, id, offset, declared as u64, available)?;
                    log::warn!(
                        "chunk '{}' at offset {} declares {} bytes but only {} remain, ignoring the rest of the file",
                        id,
                        offset,
                        declared,
                        available
                    );
                    break;
                }
                chunks.push(ChunkRecord {
                    id,
                    length: declared,
                    offset,
                });
                declared as u64
            }
        };

        // Odd-sized chunks are followed by a pad byte.
        let pad = payload_len & 1;
        pos = offset.saturating_add(payload_len).saturating_add(pad);
        stream.seek(SeekFrom::Start(pos.min(stream_len)))?;
    }

    let format = format.ok_or(IngestError::MissingChunk(ChunkKind::Format))?;
    let data = data.ok_or(IngestError::MissingChunk(ChunkKind::Data))?;

    log::debug!(
        "parsed {} container ({:?}): {:?} {} Hz x{}, data {} bytes at {}, {} other chunks",
        if is_rf64 { "RF64" } else { "RIFF" },
        mode,
        format.encoding(),
        format.sample_rate(),
        format.channels(),
        data.length,
        data.offset,
        chunks.len()
    );

    Ok(WaveContainer {
        format,
        data,
        chunks,
        is_rf64,
    })
}

/// Load the payload of one inventory chunk.
pub fn read_chunk<R: Read + Seek>(stream: &mut R, chunk: &ChunkRecord) -> Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(chunk.offset))?;
    let mut body = vec![0u8; chunk.length as usize];
    stream.read_exact(&mut body)?;
    Ok(body)
}

struct Ds64 {
    riff_size: u64,
    data_size: u64,
}

fn read_ds64<R: Read + Seek>(stream: &mut R) -> Result<Ds64> {
    if read_fourcc(stream)? != FourCc::DS64 {
        return Err(IngestError::MissingChunk(ChunkKind::Ds64));
    }
    let size = read_u32(stream)?;
    if size < DS64_FIXED_LEN {
        return Err(IngestError::MissingChunk(ChunkKind::Ds64));
    }
    let riff_size = read_u64(stream)?;
    let data_size = read_u64(stream)?;
    let _sample_count = read_u64(stream)?;

    // Table entries and future extension fields.
    let rest = (size - DS64_FIXED_LEN) as i64 + (size & 1) as i64;
    stream.seek(SeekFrom::Current(rest))?;

    Ok(Ds64 { riff_size, data_size })
}

fn check_overrun(mode: ParseMode, id: FourCc, offset: u64, declared: u64, available: u64) -> Result<()> {
    match mode {
        ParseMode::Tolerant => Ok(()),
        ParseMode::Strict => Err(IngestError::CorruptChunk {
            id: id.to_string(),
            offset,
            declared,
            available,
        }),
    }
}

fn read_fourcc<R: Read>(stream: &mut R) -> io::Result<FourCc> {
    let mut id = [0u8; 4];
    stream.read_exact(&mut id)?;
    Ok(FourCc(id))
}

fn read_u32<R: Read>(stream: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    stream.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64<R: Read>(stream: &mut R) -> io::Result<u64> {
    let mut b = [0u8; 8];
    stream.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::models::format::WaveEncoding;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        chunk_declared(id, body.len() as u32, body)
    }

    fn chunk_declared(id: &[u8; 4], declared: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    fn fmt_chunk() -> Vec<u8> {
        chunk(b"fmt ", &AudioFormatDescriptor::pcm(44100, 16, 2).to_fmt_chunk())
    }

    fn payload() -> Vec<u8> {
        (0u8..64).collect()
    }

    #[test]
    fn data_span_bounds_payload_exactly() {
        let bytes = riff(&[fmt_chunk(), chunk(b"LIST", b"INFOtest"), chunk(b"data", &payload())]);
        let mut cursor = Cursor::new(bytes.clone());

        let container = parse(&mut cursor, ParseMode::Strict).unwrap();

        assert!(!container.is_rf64);
        assert_eq!(container.format, AudioFormatDescriptor::pcm(44100, 16, 2));
        assert_eq!(container.data.length, 64);
        let span = &bytes[container.data.offset as usize..container.data.end() as usize];
        assert_eq!(span, payload().as_slice());

        assert_eq!(container.chunks.len(), 1);
        let list = container.find_chunk(FourCc(*b"LIST")).unwrap();
        assert_eq!(read_chunk(&mut cursor, list).unwrap(), b"INFOtest");
    }

    #[test]
    fn missing_fmt_chunk() {
        let bytes = riff(&[chunk(b"data", &payload())]);
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::MissingChunk(ChunkKind::Format));
    }

    #[test]
    fn missing_data_chunk() {
        let bytes = riff(&[fmt_chunk(), chunk(b"junk", &[0u8; 10])]);
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::MissingChunk(ChunkKind::Data));
    }

    #[test]
    fn header_tag_is_checked() {
        let mut bytes = riff(&[fmt_chunk(), chunk(b"data", &payload())]);
        bytes[0..4].copy_from_slice(b"RIFX");
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::Format(FormatFault::NoRiffHeader));

        let err = parse(&mut Cursor::new(Vec::new()), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::Format(FormatFault::NoRiffHeader));

        let err = parse(&mut Cursor::new(b"RIFF".to_vec()), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::Format(FormatFault::NoRiffHeader));

        let err = parse(&mut Cursor::new(b"RIFF\x10\x00".to_vec()), ParseMode::Strict).unwrap_err();
        assert_eq!(err, IngestError::Format(FormatFault::NoRiffHeader));
    }

    #[test]
    fn form_type_must_be_wave() {
        let mut bytes = riff(&[fmt_chunk(), chunk(b"data", &payload())]);
        bytes[8..12].copy_from_slice(b"AVI ");
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::Format(FormatFault::NotWave));
    }

    #[test]
    fn trailing_corruption_tolerated_only_in_tolerant_mode() {
        let bytes = riff(&[
            fmt_chunk(),
            chunk(b"data", &payload()),
            chunk_declared(b"LIST", 0x7FFF_FFF0, b"INFO"),
        ]);

        let container = parse(&mut Cursor::new(bytes.clone()), ParseMode::Tolerant).unwrap();
        assert_eq!(container.data.length, 64);
        assert!(container.chunks.is_empty());

        let err = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap_err();
        match err {
            IngestError::CorruptChunk { id, declared, available, .. } => {
                assert_eq!(id, "LIST");
                assert_eq!(declared, 0x7FFF_FFF0);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn corruption_before_data_still_fails() {
        let bytes = riff(&[fmt_chunk(), chunk_declared(b"junk", 1_000_000, &[0u8; 8])]);
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::MissingChunk(ChunkKind::Data));
    }

    #[test]
    fn declared_riff_size_overrun_is_tolerated() {
        let mut bytes = riff(&[fmt_chunk(), chunk(b"data", &payload())]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let container = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap();
        assert_eq!(container.data.length, 64);
    }

    #[test]
    fn declared_riff_size_underrun_stops_the_walk() {
        let mut bytes = riff(&[fmt_chunk(), chunk(b"data", &payload())]);
        let declared = bytes.len() as u32 - 8;
        bytes.extend_from_slice(&chunk(b"cue ", &[0u8; 4]));
        bytes[4..8].copy_from_slice(&declared.to_le_bytes());

        let container = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap();
        assert!(container.find_chunk(FourCc(*b"cue ")).is_none());
    }

    #[test]
    fn odd_sized_chunks_are_padded() {
        let bytes = riff(&[fmt_chunk(), chunk(b"note", b"abc"), chunk(b"data", &payload())]);
        let container = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap();

        let note = container.find_chunk(FourCc(*b"note")).unwrap();
        assert_eq!(note.length, 3);
        assert_eq!(container.data.length, 64);
    }

    #[test]
    fn truncated_data_chunk() {
        let bytes = riff(&[fmt_chunk(), chunk_declared(b"data", 1000, &payload())]);

        let container = parse(&mut Cursor::new(bytes.clone()), ParseMode::Tolerant).unwrap();
        assert_eq!(container.data.length, 1000);

        let err = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap_err();
        assert!(matches!(err, IngestError::CorruptChunk { .. }));
    }

    #[test]
    fn extensible_format_is_parsed() {
        let format = AudioFormatDescriptor::extensible(48000, 24, 2, WaveEncoding::Pcm);
        let bytes = riff(&[chunk(b"fmt ", &format.to_fmt_chunk()), chunk(b"data", &payload())]);
        let container = parse(&mut Cursor::new(bytes), ParseMode::Strict).unwrap();
        assert_eq!(container.format, format);
        assert_eq!(container.format.sub_format(), Some(WaveEncoding::Pcm));
    }

    #[test]
    fn parse_starts_at_current_position() {
        let mut bytes = vec![0xEE; 10];
        bytes.extend_from_slice(&riff(&[fmt_chunk(), chunk(b"data", &payload())]));
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(10);

        let container = parse(&mut cursor, ParseMode::Strict).unwrap();
        assert_eq!(container.data.offset, 10 + 12 + 24 + 8);
    }

    /// A stream whose bytes past `head` read as zeros up to `len`, so multi-gigabyte
    /// containers can be parsed without allocating them.
    struct SparseStream {
        head: Vec<u8>,
        len: u64,
        pos: u64,
    }

    impl Read for SparseStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = (self.len.saturating_sub(self.pos)).min(buf.len() as u64) as usize;
            for (i, b) in buf[..n].iter_mut().enumerate() {
                let at = self.pos + i as u64;
                *b = self.head.get(at as usize).copied().unwrap_or(0);
            }
            self.pos += n as u64;
            Ok(n)
        }
    }

    impl Seek for SparseStream {
        fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
            self.pos = match to {
                SeekFrom::Start(p) => p,
                SeekFrom::End(d) => (self.len as i64 + d) as u64,
                SeekFrom::Current(d) => (self.pos as i64 + d) as u64,
            };
            Ok(self.pos)
        }
    }

    fn rf64_head(data_size: u64, ds64_len: u32) -> Vec<u8> {
        let mut ds64 = Vec::new();
        ds64.extend_from_slice(&0u64.to_le_bytes()); // riff size, patched below
        ds64.extend_from_slice(&data_size.to_le_bytes());
        ds64.extend_from_slice(&(data_size / 4).to_le_bytes());
        ds64.resize(ds64_len as usize, 0);

        let mut head = Vec::new();
        head.extend_from_slice(b"RF64");
        head.extend_from_slice(&u32::MAX.to_le_bytes());
        head.extend_from_slice(b"WAVE");
        head.extend_from_slice(&chunk(b"ds64", &ds64));
        head.extend_from_slice(&fmt_chunk());
        head.extend_from_slice(b"data");
        head.extend_from_slice(&u32::MAX.to_le_bytes());

        let riff_size = head.len() as u64 - 8 + data_size;
        head[20..28].copy_from_slice(&riff_size.to_le_bytes());
        head
    }

    #[test]
    fn rf64_data_size_is_64_bit() {
        let data_size = 5 * 1024 * 1024 * 1024u64 + 4;
        let head = rf64_head(data_size, 28);
        let len = head.len() as u64 + data_size;
        let mut stream = SparseStream { head, len, pos: 0 };

        let container = parse(&mut stream, ParseMode::Strict).unwrap();

        assert!(container.is_rf64);
        assert_eq!(container.data.length, data_size);
        assert_eq!(container.data.end(), len);
    }

    #[test]
    fn chunk_length_past_i32_max_is_corruption() {
        let declared = 0x8000_0000u32;
        let mut head = riff(&[fmt_chunk(), chunk(b"data", &[1, 2, 3, 4])]);
        head.extend_from_slice(b"junk");
        head.extend_from_slice(&declared.to_le_bytes());
        head[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let len = head.len() as u64 + declared as u64 + 16;

        let mut stream = SparseStream { head: head.clone(), len, pos: 0 };
        let container = parse(&mut stream, ParseMode::Tolerant).unwrap();
        assert_eq!(container.data.length, 4);
        assert!(container.chunks.is_empty());

        let mut stream = SparseStream { head, len, pos: 0 };
        match parse(&mut stream, ParseMode::Strict).unwrap_err() {
            IngestError::CorruptChunk { id, declared: d, .. } => {
                assert_eq!(id, "junk");
                assert_eq!(d, declared as u64);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn rf64_requires_ds64() {
        let mut bytes = riff(&[fmt_chunk(), chunk(b"data", &payload())]);
        bytes[0..4].copy_from_slice(b"RF64");
        let err = parse(&mut Cursor::new(bytes), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::MissingChunk(ChunkKind::Ds64));

        let mut head = rf64_head(64, 24);
        head.truncate(20);
        let err = parse(&mut Cursor::new(head), ParseMode::Tolerant).unwrap_err();
        assert_eq!(err, IngestError::MissingChunk(ChunkKind::Ds64));
    }
}
