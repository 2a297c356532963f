use std::sync::Arc;

use crate::models::error::Result;
use crate::models::format::AudioFormatDescriptor;
use crate::session::buffers::CaptureBuffer;
use crate::session::signal::CaptureSignal;

/// A driver that fills queued buffers asynchronously and raises a signal per completion
/// (the `waveIn` contract).
///
/// Implemented by:
/// - `WaveInDevice` (Windows)
///
/// The pipeline calls `open` and `close` from its control thread and everything else
/// from either the control thread or its worker, so implementations guard their own
/// state.
pub trait BufferQueueDevice: Send + Sync {
    /// Open the device for `format`. `signal` must be raised whenever a queued buffer
    /// becomes filled.
    fn open(&self, format: &AudioFormatDescriptor, signal: Arc<CaptureSignal>) -> Result<()>;

    /// Take ownership of a buffer in state `QueuedToDevice` and fill it when audio arrives.
    fn queue(&self, buffer: CaptureBuffer) -> Result<()>;

    /// Hand back buffer `index` if, and only if, the device has filled it.
    fn take_filled(&self, index: usize) -> Result<Option<CaptureBuffer>>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Abandon pending fills and hand back every buffer still held, filled or not.
    fn reset(&self) -> Result<Vec<CaptureBuffer>>;

    /// Release the device handle. Only called once no buffers are outstanding.
    fn close(&self);
}
