//! # pcm-ingest-core
//!
//! Platform-agnostic PCM ingestion library.
//!
//! Reads RIFF/RF64 WAVE containers, drives audio capture devices through two
//! capture models (a buffer queue and a polling loop), and mixes float streams
//! into one bus. Platform backends (Windows waveIn, WASAPI) implement the device
//! traits and plug into the generic capture sessions.
//!
//! ## Architecture
//!
//! ```text
//! pcm-ingest-core (this crate)
//! ├── traits/       ← PcmStream, CaptureSink, BufferQueueDevice, PollingCaptureDevice
//! ├── models/       ← IngestError, AudioFormatDescriptor, WaveContainer, configs, CaptureState
//! ├── processing/   ← RIFF/RF64 reader, WAV header generation, MixerBus
//! ├── session/      ← BufferQueueCapture, PollingCapture, capture buffers
//! └── storage/      ← WaveFileReader, WaveFileWriter, CaptureFileWriter, summary sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{BufferQueueConfig, ParseMode, PollingCaptureConfig, ShareMode, StreamMode};
pub use models::container::{ChunkRecord, DataSpan, FourCc, WaveContainer};
pub use models::error::{ChunkKind, FormatFault, IngestError, Result};
pub use models::format::{AudioFormatDescriptor, WaveEncoding};
pub use models::recording_result::RecordingSummary;
pub use models::state::CaptureState;
pub use processing::mixer::{InputId, MixerBus};
pub use processing::riff_reader::parse;
pub use session::buffer_queue::BufferQueueCapture;
pub use session::buffers::{BufferState, CaptureBuffer};
pub use session::polling::PollingCapture;
pub use session::signal::CaptureSignal;
pub use storage::capture_writer::CaptureFileWriter;
pub use storage::raw_stream::RawPcmStream;
pub use storage::wave_reader::WaveFileReader;
pub use storage::wave_writer::WaveFileWriter;
pub use traits::buffer_device::BufferQueueDevice;
pub use traits::capture_sink::{CaptureEvent, CaptureSink, ChannelSink};
pub use traits::pcm_stream::PcmStream;
pub use traits::polling_device::{CapturePacket, PollingCaptureDevice};
