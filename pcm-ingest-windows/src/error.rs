use thiserror::Error;

use pcm_ingest_core::models::error::IngestError;

/// Failures reported by the Windows audio APIs.
#[derive(Debug, Error)]
pub enum WindowsAudioError {
    /// A `waveIn*` call returned a non-zero `MMRESULT`.
    #[error("{call} failed with MMRESULT {code}")]
    Mm { call: &'static str, code: u32 },

    #[error("{call} failed: {source}")]
    Com {
        call: &'static str,
        source: windows::core::Error,
    },

    #[error("device is {0}")]
    State(&'static str),
}

impl From<WindowsAudioError> for IngestError {
    fn from(e: WindowsAudioError) -> Self {
        IngestError::DeviceFailure(e.to_string())
    }
}

/// Turn an `MMRESULT` into a result.
pub(crate) fn mm_check(call: &'static str, code: u32) -> Result<(), WindowsAudioError> {
    if code == 0 {
        Ok(())
    } else {
        Err(WindowsAudioError::Mm { call, code })
    }
}

/// Attach the failing call's name to a COM error.
pub(crate) trait ComContext<T> {
    fn context(self, call: &'static str) -> Result<T, WindowsAudioError>;
}

impl<T> ComContext<T> for windows::core::Result<T> {
    fn context(self, call: &'static str) -> Result<T, WindowsAudioError> {
        self.map_err(|source| WindowsAudioError::Com { call, source })
    }
}
