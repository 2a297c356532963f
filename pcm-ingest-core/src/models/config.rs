use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::IngestError;
use super::format::AudioFormatDescriptor;

/// How the container reader treats structural damage after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Stop at trailing corruption and keep whatever was found before it.
    #[default]
    Tolerant,
    /// Report every out-of-range chunk as an error.
    Strict,
}

/// Whether the device stream is shared with the system mixer or owned outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    #[default]
    Shared,
    Exclusive,
}

/// What the polling device captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// An input endpoint such as a microphone.
    #[default]
    Capture,
    /// The mix going to a render endpoint.
    Loopback,
}

/// Configuration for the buffer-queue capture pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferQueueConfig {
    /// Length of each capture buffer in milliseconds (default: 100).
    pub buffer_milliseconds: u32,

    /// Number of buffers cycled through the device (default: 3).
    pub number_of_buffers: usize,

    /// Format requested from the device (default: 16-bit PCM, 44.1 kHz, stereo).
    pub format: AudioFormatDescriptor,
}

impl BufferQueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_milliseconds == 0 {
            return Err("buffer length must be positive".into());
        }
        if self.number_of_buffers < 2 {
            return Err(format!("need at least 2 buffers, got {}", self.number_of_buffers));
        }
        if self.format.block_align() == 0 || self.format.average_bytes_per_second() == 0 {
            return Err("format has no block alignment or byte rate".into());
        }
        if self.buffer_bytes() == 0 {
            return Err(format!(
                "{} ms is shorter than one frame of the requested format",
                self.buffer_milliseconds
            ));
        }
        Ok(())
    }

    /// Size of each buffer: the configured duration rounded down to whole frames.
    pub fn buffer_bytes(&self) -> usize {
        self.format
            .bytes_for_duration(Duration::from_millis(self.buffer_milliseconds as u64))
    }

    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IngestError::InvalidArgument(format!("bad config: {}", e)))?;
        config.validate().map_err(IngestError::InvalidArgument)?;
        Ok(config)
    }
}

impl Default for BufferQueueConfig {
    fn default() -> Self {
        Self {
            buffer_milliseconds: 100,
            number_of_buffers: 3,
            format: AudioFormatDescriptor::pcm(44100, 16, 2),
        }
    }
}

/// Configuration for the polling capture loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingCaptureConfig {
    pub share_mode: ShareMode,

    pub stream_mode: StreamMode,

    /// Buffering duration requested at initialization in milliseconds (default: 100).
    pub buffer_milliseconds: u32,

    /// Format to use instead of the device's mix format.
    pub requested_format: Option<AudioFormatDescriptor>,
}

impl PollingCaptureConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_milliseconds == 0 {
            return Err("buffer duration must be positive".into());
        }
        if self.stream_mode == StreamMode::Loopback && self.share_mode == ShareMode::Exclusive {
            return Err("loopback capture requires shared mode".into());
        }
        Ok(())
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_milliseconds as u64)
    }

    /// Loopback capture of the default render endpoint.
    pub fn loopback() -> Self {
        Self {
            stream_mode: StreamMode::Loopback,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IngestError::InvalidArgument(format!("bad config: {}", e)))?;
        config.validate().map_err(IngestError::InvalidArgument)?;
        Ok(config)
    }
}

impl Default for PollingCaptureConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            stream_mode: StreamMode::Capture,
            buffer_milliseconds: 100,
            requested_format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_queue_config_is_valid() {
        let config = BufferQueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_bytes(), 17640);
    }

    #[test]
    fn single_buffer_is_rejected() {
        let config = BufferQueueConfig {
            number_of_buffers: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn buffer_queue_config_from_partial_json() {
        let config = BufferQueueConfig::from_json(r#"{ "buffer_milliseconds": 50 }"#).unwrap();
        assert_eq!(config.buffer_milliseconds, 50);
        assert_eq!(config.number_of_buffers, 3);
    }

    #[test]
    fn invalid_json_config_is_an_argument_error() {
        let err = BufferQueueConfig::from_json(r#"{ "number_of_buffers": 0 }"#).unwrap_err();
        assert!(matches!(err, IngestError::InvalidArgument(_)));
    }

    #[test]
    fn exclusive_loopback_is_rejected() {
        let config = PollingCaptureConfig {
            share_mode: ShareMode::Exclusive,
            ..PollingCaptureConfig::loopback()
        };
        assert!(config.validate().is_err());

        let err = PollingCaptureConfig::from_json(r#"{ "share_mode": "exclusive", "stream_mode": "loopback" }"#)
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidArgument(_)));
    }

    #[test]
    fn parse_mode_defaults_to_tolerant() {
        assert_eq!(ParseMode::default(), ParseMode::Tolerant);
        let mode: ParseMode = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(mode, ParseMode::Strict);
    }
}
