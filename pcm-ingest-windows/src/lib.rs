//! # pcm-ingest-windows
//!
//! Windows capture devices for pcm-ingest.
//!
//! Provides:
//! - `WaveInDevice`: waveIn buffer-queue device for `BufferQueueCapture`
//! - `WasapiDevice`: WASAPI capture or loopback endpoint for `PollingCapture`
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use pcm_ingest_core::{ChannelSink, PollingCapture, PollingCaptureConfig};
//! use pcm_ingest_windows::WasapiDevice;
//!
//! let (sink, events) = ChannelSink::bounded(64);
//! let device = WasapiDevice::default_render().unwrap();
//! let mut capture = PollingCapture::new(device, PollingCaptureConfig::loopback(), Arc::new(sink));
//! capture.start().unwrap();
//! ```

#[cfg(target_os = "windows")]
pub mod error;
#[cfg(target_os = "windows")]
pub mod wasapi_device;
#[cfg(target_os = "windows")]
pub mod wave_in;
#[cfg(target_os = "windows")]
mod waveformat;

#[cfg(target_os = "windows")]
pub use error::WindowsAudioError;
#[cfg(target_os = "windows")]
pub use wasapi_device::WasapiDevice;
#[cfg(target_os = "windows")]
pub use wave_in::WaveInDevice;
