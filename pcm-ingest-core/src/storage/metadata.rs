use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::{IngestError, Result};
use crate::models::recording_result::RecordingSummary;

/// Sidecar location for a recording: `take.wav` → `take.summary.json`.
pub fn summary_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("summary.json")
}

/// Write a recording summary as a JSON sidecar file.
pub fn write_summary(summary: &RecordingSummary, recording_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| IngestError::Io(format!("failed to serialize summary: {}", e)))?;
    fs::write(summary_path(recording_path), json)?;
    Ok(())
}

/// Read a recording summary from its JSON sidecar file.
pub fn read_summary(recording_path: &Path) -> Result<RecordingSummary> {
    let json = fs::read_to_string(summary_path(recording_path))?;
    serde_json::from_str(&json).map_err(|e| IngestError::Io(format!("failed to parse summary: {}", e)))
}
