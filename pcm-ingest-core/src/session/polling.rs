use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{PollingCaptureConfig, ShareMode, StreamMode};
use crate::models::error::{IngestError, Result};
use crate::models::format::AudioFormatDescriptor;
use crate::models::state::CaptureState;
use crate::session::signal::CaptureSignal;
use crate::traits::capture_sink::CaptureSink;
use crate::traits::polling_device::PollingCaptureDevice;

/// Polling capture loop over a continuously running device.
///
/// The worker sleeps for half the device buffer, then drains every pending packet
/// into one scratch buffer and flushes it to the sink. A flush happens on every wake,
/// even when nothing arrived.
pub struct PollingCapture<D: PollingCaptureDevice + 'static> {
    device: Arc<D>,
    config: PollingCaptureConfig,
    sink: Arc<dyn CaptureSink>,
    state: Arc<Mutex<CaptureState>>,
    stop_requested: Arc<AtomicBool>,
    // Lets stop() cut the current sleep short.
    wake: Arc<CaptureSignal>,
    worker: Option<thread::JoinHandle<()>>,
    format: Option<AudioFormatDescriptor>,
    buffer_frames: u32,
}

impl<D: PollingCaptureDevice + 'static> PollingCapture<D> {
    pub fn new(device: D, config: PollingCaptureConfig, sink: Arc<dyn CaptureSink>) -> Self {
        Self {
            device: Arc::new(device),
            config,
            sink,
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(CaptureSignal::new()),
            worker: None,
            format: None,
            buffer_frames: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// The negotiated format, once initialized.
    pub fn format(&self) -> Option<&AudioFormatDescriptor> {
        self.format.as_ref()
    }

    /// Frames in the device buffer, once initialized.
    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    /// Negotiate a format and initialize the device. Only legal once.
    pub fn initialize(&mut self) -> Result<()> {
        let state = self.state();
        if state != CaptureState::Idle {
            return Err(IngestError::InvalidOperation(format!("cannot initialize capture while {:?}", state)));
        }

        let share_mode = self.config.share_mode;
        if self.config.stream_mode == StreamMode::Loopback && share_mode == ShareMode::Exclusive {
            return Err(IngestError::UnsupportedFormat("loopback capture requires shared mode".into()));
        }
        self.config.validate().map_err(IngestError::InvalidArgument)?;

        let proposed = match &self.config.requested_format {
            Some(format) => format.clone(),
            None => self.device.mix_format()?,
        };
        let format = negotiate(&*self.device, share_mode, proposed)?;

        self.device.initialize(
            share_mode,
            self.config.stream_mode,
            self.config.buffer_duration(),
            &format,
        )?;
        let frames = self.device.buffer_frame_count()?;
        if frames == 0 {
            return Err(IngestError::DeviceFailure("device reported an empty buffer".into()));
        }

        log::info!(
            "polling capture initialized: {:?} {} Hz, {} ch, {} bit, {} frame buffer",
            format.encoding(),
            format.sample_rate(),
            format.channels(),
            format.bits_per_sample(),
            frames
        );

        self.buffer_frames = frames;
        self.format = Some(format);
        *self.state.lock() = CaptureState::Initialized;
        Ok(())
    }

    /// Start the device and the polling worker, initializing first if needed.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if !state.can_start() {
            return Err(IngestError::InvalidOperation(format!("cannot start capture while {:?}", state)));
        }
        if state == CaptureState::Idle {
            self.initialize()?;
        }
        self.join_worker();

        let Some(format) = self.format.clone() else {
            return Err(IngestError::InvalidOperation("capture is not initialized".into()));
        };
        let frame_bytes = format.block_align() as usize;
        let scratch_len = self.buffer_frames as usize * frame_bytes;
        let interval = format.duration_of(scratch_len as u64) / 2;

        self.stop_requested.store(false, Ordering::SeqCst);
        self.device.start()?;
        *self.state.lock() = CaptureState::Recording;

        let device = Arc::clone(&self.device);
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let stop_requested = Arc::clone(&self.stop_requested);
        let wake = Arc::clone(&self.wake);

        let spawned = thread::Builder::new()
            .name("capture-polling".into())
            .spawn(move || {
                let mut scratch = vec![0u8; scratch_len];
                let mut result = polling_loop(&*device, &*sink, &wake, &stop_requested, interval, &mut scratch, frame_bytes);
                if let Err(ref e) = result {
                    log::error!("polling capture failed: {}", e);
                }
                if let Err(e) = device.stop() {
                    log::warn!("device stop failed: {}", e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                *state.lock() = CaptureState::Stopped;
                log::info!("polling capture stopped");
                sink.on_recording_stopped(result.err().as_ref());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                log::info!("polling capture started");
                Ok(())
            }
            Err(e) => {
                let _ = self.device.stop();
                *self.state.lock() = CaptureState::Initialized;
                Err(IngestError::DeviceFailure(format!("failed to spawn capture thread: {}", e)))
            }
        }
    }

    /// Ask the worker to exit on its next wake. The device is stopped but kept.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != CaptureState::Recording {
                return Ok(());
            }
            *state = CaptureState::Stopping;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.raise();
        Ok(())
    }

    /// Stop, join the worker, and release the device. Idempotent.
    pub fn dispose(&mut self) {
        if self.state().is_disposed() {
            return;
        }
        let _ = self.stop();
        self.join_worker();
        self.device.release();
        *self.state.lock() = CaptureState::Disposed;
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("capture worker panicked");
        }
    }
}

impl<D: PollingCaptureDevice + 'static> Drop for PollingCapture<D> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pick the format to initialize with: the plain equivalent of an extensible
/// proposal when the device accepts it, otherwise the proposal itself.
fn negotiate(
    device: &dyn PollingCaptureDevice,
    share_mode: ShareMode,
    proposed: AudioFormatDescriptor,
) -> Result<AudioFormatDescriptor> {
    if let Some(standard) = proposed.to_standard() {
        if device.is_format_supported(share_mode, &standard) {
            return Ok(standard);
        }
        log::debug!("device rejected reduced format, keeping extensible");
    }
    if device.is_format_supported(share_mode, &proposed) {
        Ok(proposed)
    } else {
        Err(IngestError::UnsupportedFormat(format!(
            "{:?} {} Hz, {} ch, {} bit not supported in {:?} mode",
            proposed.encoding(),
            proposed.sample_rate(),
            proposed.channels(),
            proposed.bits_per_sample(),
            share_mode
        )))
    }
}

fn polling_loop(
    device: &dyn PollingCaptureDevice,
    sink: &dyn CaptureSink,
    wake: &CaptureSignal,
    stop_requested: &AtomicBool,
    interval: Duration,
    scratch: &mut [u8],
    frame_bytes: usize,
) -> Result<()> {
    while !stop_requested.load(Ordering::SeqCst) {
        wake.wait_timeout(interval);
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }
        drain(device, sink, scratch, frame_bytes)?;
    }
    Ok(())
}

/// Copy every pending packet into `scratch`, flushing whenever the next packet would
/// not fit, then flush what is left.
fn drain(device: &dyn PollingCaptureDevice, sink: &dyn CaptureSink, scratch: &mut [u8], frame_bytes: usize) -> Result<()> {
    let mut offset = 0;
    while device.next_packet_frames()? != 0 {
        device.read_packet(&mut |packet| {
            let bytes = (packet.frames as usize * frame_bytes).min(scratch.len());
            if offset + bytes > scratch.len() {
                sink.on_data_available(&scratch[..offset]);
                offset = 0;
            }
            let region = &mut scratch[offset..offset + bytes];
            if packet.silent {
                region.fill(0);
            } else {
                let n = bytes.min(packet.data.len());
                region[..n].copy_from_slice(&packet.data[..n]);
                region[n..].fill(0);
            }
            offset += bytes;
        })?;
    }
    sink.on_data_available(&scratch[..offset]);
    Ok(())
}
