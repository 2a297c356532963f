use std::path::PathBuf;

use parking_lot::Mutex;

use crate::models::error::{IngestError, Result};
use crate::models::format::AudioFormatDescriptor;
use crate::models::recording_result::RecordingSummary;
use crate::storage::metadata;
use crate::storage::wave_writer::WaveFileWriter;
use crate::traits::capture_sink::CaptureSink;

/// Capture sink that records straight to a WAV file.
///
/// Every data notification is appended; the stopped notification finalizes the
/// file and writes the summary sidecar. The first write failure is kept and later
/// data is discarded.
pub struct CaptureFileWriter {
    state: Mutex<WriterState>,
}

struct WriterState {
    writer: WaveFileWriter,
    error: Option<IngestError>,
    outcome: Option<Result<RecordingSummary>>,
}

impl CaptureFileWriter {
    /// `format` must be the session's format: the buffer-queue config format or the
    /// negotiated polling format.
    pub fn create(file_path: impl Into<PathBuf>, format: AudioFormatDescriptor) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(WriterState {
                writer: WaveFileWriter::create(file_path, format)?,
                error: None,
                outcome: None,
            }),
        })
    }

    /// The summary of the finalized file, once the session has stopped.
    pub fn outcome(&self) -> Option<Result<RecordingSummary>> {
        self.state.lock().outcome.clone()
    }

    pub fn data_bytes(&self) -> u64 {
        self.state.lock().writer.data_bytes()
    }
}

impl CaptureSink for CaptureFileWriter {
    fn on_data_available(&self, data: &[u8]) {
        let mut state = self.state.lock();
        if state.error.is_some() || state.writer.is_finalized() {
            return;
        }
        if let Err(e) = state.writer.write(data) {
            log::error!("capture file write failed: {}", e);
            state.error = Some(e);
        }
    }

    fn on_recording_stopped(&self, error: Option<&IngestError>) {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return;
        }
        if let Some(e) = error {
            log::warn!("capture ended with error, finalizing partial file: {}", e);
        }

        let finalized = state.writer.finalize();
        let outcome = match (state.error.take(), finalized) {
            (Some(e), _) | (None, Err(e)) => Err(e),
            (None, Ok(summary)) => metadata::write_summary(&summary, &summary.file_path).map(|_| summary),
        };
        state.outcome = Some(outcome);
    }
}
