use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::{IngestError, Result};
use crate::models::format::AudioFormatDescriptor;
use crate::models::recording_result::RecordingSummary;
use crate::processing::wav_format;

/// Streaming WAV file writer.
///
/// Writes a header with placeholder sizes on creation, appends PCM as it arrives, and
/// patches the sizes on [`finalize`](Self::finalize).
///
/// ## File Format
///
/// ```text
/// [RIFF header + fmt chunk + data chunk header]
/// [PCM data...]
/// [pad byte, when the data length is odd]
/// ```
pub struct WaveFileWriter {
    file_path: PathBuf,
    format: AudioFormatDescriptor,
    file: Option<BufWriter<File>>,
    header_len: u64,
    data_bytes: u64,
}

impl WaveFileWriter {
    /// Create the file (and its directory) and write the initial header.
    pub fn create(file_path: impl Into<PathBuf>, format: AudioFormatDescriptor) -> Result<Self> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = BufWriter::new(File::create(&file_path)?);
        let header = wav_format::generate_header(&format, 0);
        file.write_all(&header)?;

        Ok(Self {
            file_path,
            format,
            file: Some(file),
            header_len: header.len() as u64,
            data_bytes: 0,
        })
    }

    /// Append PCM bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| IngestError::InvalidOperation("writer is already finalized".into()))?;

        let total = self.header_len + self.data_bytes + data.len() as u64;
        if total > u32::MAX as u64 {
            return Err(IngestError::InvalidOperation("WAV data would exceed the 4 GiB RIFF limit".into()));
        }

        file.write_all(data)?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Finalize the file: pad, patch the header sizes, compute the SHA-256 checksum.
    pub fn finalize(&mut self) -> Result<RecordingSummary> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| IngestError::InvalidOperation("writer is already finalized".into()))?;

        let pad = self.data_bytes & 1;
        if pad == 1 {
            file.write_all(&[0])?;
        }

        let mut header = wav_format::generate_header(&self.format, 0);
        wav_format::patch_data_size(&mut header, self.data_bytes);
        wav_format::patch_riff_size(&mut header, self.header_len + self.data_bytes + pad);

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.flush()?;
        drop(file);

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "finalized {} ({} data bytes)",
            self.file_path.display(),
            self.data_bytes
        );
        Ok(RecordingSummary::new(
            self.file_path.clone(),
            self.format.clone(),
            self.data_bytes,
            checksum,
        ))
    }

    /// PCM bytes written so far, excluding the header.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn format(&self) -> &AudioFormatDescriptor {
        &self.format
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_finalized(&self) -> bool {
        self.file.is_none()
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
