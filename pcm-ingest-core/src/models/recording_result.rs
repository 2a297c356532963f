use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::format::AudioFormatDescriptor;

/// Summary of a WAV file written and finalized by [`crate::WaveFileWriter`].
///
/// Serializable for the JSON sidecar written by [`crate::storage::metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: uuid::Uuid,
    pub file_path: PathBuf,
    pub format: AudioFormatDescriptor,
    pub data_bytes: u64,
    pub duration_secs: f64,
    /// Lowercase hex SHA-256 of the complete file.
    pub checksum: String,
    /// RFC 3339 timestamp of finalization.
    pub created_at: String,
}

impl RecordingSummary {
    pub fn new(file_path: PathBuf, format: AudioFormatDescriptor, data_bytes: u64, checksum: String) -> Self {
        let duration_secs = format.duration_of(data_bytes).as_secs_f64();
        Self {
            id: uuid::Uuid::new_v4(),
            file_path,
            format,
            data_bytes,
            duration_secs,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
