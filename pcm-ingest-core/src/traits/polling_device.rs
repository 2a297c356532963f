use std::time::Duration;

use crate::models::config::{ShareMode, StreamMode};
use crate::models::error::Result;
use crate::models::format::AudioFormatDescriptor;

/// One packet of captured frames, borrowed from the device until it is released.
#[derive(Debug, Clone, Copy)]
pub struct CapturePacket<'a> {
    pub data: &'a [u8],
    pub frames: u32,
    /// The device marked the packet as silence; `data` must not be used.
    pub silent: bool,
}

/// A continuously running device drained by polling (the WASAPI contract).
///
/// Implemented by:
/// - `WasapiDevice` (Windows)
pub trait PollingCaptureDevice: Send + Sync {
    /// The format the device's shared-mode engine runs at.
    fn mix_format(&self) -> Result<AudioFormatDescriptor>;

    fn is_format_supported(&self, share_mode: ShareMode, format: &AudioFormatDescriptor) -> bool;

    fn initialize(
        &self,
        share_mode: ShareMode,
        stream_mode: StreamMode,
        buffer_duration: Duration,
        format: &AudioFormatDescriptor,
    ) -> Result<()>;

    /// Frames in the device buffer, valid after `initialize`.
    fn buffer_frame_count(&self) -> Result<u32>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Frames in the next available packet, zero when none is ready.
    fn next_packet_frames(&self) -> Result<u32>;

    /// Obtain the next packet, pass it to `visit`, then release it back to the device.
    fn read_packet(&self, visit: &mut dyn FnMut(CapturePacket<'_>)) -> Result<()>;

    /// Drop the device client. Called once at disposal.
    fn release(&self);
}
