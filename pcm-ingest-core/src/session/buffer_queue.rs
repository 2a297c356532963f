use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::BufferQueueConfig;
use crate::models::error::{IngestError, Result};
use crate::models::state::CaptureState;
use crate::session::buffers::{BufferState, CaptureBuffer};
use crate::session::signal::CaptureSignal;
use crate::traits::buffer_device::BufferQueueDevice;
use crate::traits::capture_sink::CaptureSink;

/// Buffer-queue capture pipeline.
///
/// Keeps `number_of_buffers` buffers cycling through a [`BufferQueueDevice`] and drains
/// completed ones on a dedicated worker thread:
/// ```text
/// [Device] ──filled──→ [Worker] ──data──→ [CaptureSink]
///    ↑                    │
///    └──────requeue───────┘
/// ```
pub struct BufferQueueCapture<D: BufferQueueDevice + 'static> {
    device: Arc<D>,
    config: BufferQueueConfig,
    sink: Arc<dyn CaptureSink>,
    signal: Arc<CaptureSignal>,
    state: Arc<Mutex<CaptureState>>,
    stop_requested: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    device_open: bool,
}

impl<D: BufferQueueDevice + 'static> BufferQueueCapture<D> {
    pub fn new(device: D, config: BufferQueueConfig, sink: Arc<dyn CaptureSink>) -> Result<Self> {
        config.validate().map_err(IngestError::InvalidArgument)?;
        Ok(Self {
            device: Arc::new(device),
            config,
            sink,
            signal: Arc::new(CaptureSignal::new()),
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            worker: None,
            device_open: false,
        })
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    pub fn config(&self) -> &BufferQueueConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Queue every buffer to the device, start it, and spawn the worker.
    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            if !state.can_start() {
                return Err(IngestError::InvalidOperation(format!("cannot start capture while {:?}", *state)));
            }
        }

        self.join_worker();

        if !self.device_open {
            self.device.open(&self.config.format, Arc::clone(&self.signal))?;
            self.device_open = true;
            *self.state.lock() = CaptureState::Initialized;
        }

        let buffer_bytes = self.config.buffer_bytes();
        let count = self.config.number_of_buffers;
        log::debug!("buffer-queue capture: {} buffers of {} bytes", count, buffer_bytes);

        self.stop_requested.store(false, Ordering::SeqCst);
        for index in 0..count {
            let mut buffer = CaptureBuffer::new(index, buffer_bytes);
            buffer.mark_queued();
            if let Err(e) = self.device.queue(buffer) {
                self.abandon_buffers();
                return Err(e);
            }
        }

        if let Err(e) = self.device.start() {
            self.abandon_buffers();
            return Err(e);
        }

        *self.state.lock() = CaptureState::Recording;

        let device = Arc::clone(&self.device);
        let sink = Arc::clone(&self.sink);
        let signal = Arc::clone(&self.signal);
        let state = Arc::clone(&self.state);
        let stop_requested = Arc::clone(&self.stop_requested);

        let spawned = thread::Builder::new()
            .name("capture-buffer-queue".into())
            .spawn(move || {
                let mut result = capture_loop(&*device, &*sink, &signal, &stop_requested, count);
                if let Err(ref e) = result {
                    log::error!("buffer-queue capture failed: {}", e);
                    if let Err(e) = device.stop() {
                        log::warn!("device stop failed: {}", e);
                    }
                }
                match device.reset() {
                    Ok(leftover) => deliver_leftovers(leftover, &*sink),
                    Err(e) => {
                        log::warn!("failed to reclaim capture buffers: {}", e);
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
                *state.lock() = CaptureState::Stopped;
                log::info!("buffer-queue capture stopped");
                sink.on_recording_stopped(result.err().as_ref());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                log::info!("buffer-queue capture started");
                Ok(())
            }
            Err(e) => {
                let _ = self.device.stop();
                self.abandon_buffers();
                *self.state.lock() = CaptureState::Initialized;
                Err(IngestError::DeviceFailure(format!("failed to spawn capture thread: {}", e)))
            }
        }
    }

    /// Ask the session to stop. Returns immediately; the stopped notification follows
    /// once the worker has drained the last buffers.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != CaptureState::Recording {
                return Ok(());
            }
            *state = CaptureState::Stopping;
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        self.signal.raise();
        self.device.stop()
    }

    /// Stop, join the worker, then release the buffers and the device. Idempotent.
    pub fn dispose(&mut self) {
        if self.state().is_disposed() {
            return;
        }

        if let Err(e) = self.stop() {
            log::warn!("device stop failed during dispose: {}", e);
        }
        self.join_worker();

        if self.device_open {
            self.abandon_buffers();
            self.device.close();
            self.device_open = false;
        }
        *self.state.lock() = CaptureState::Disposed;
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        // Restarting from inside the stopped notification runs on the worker itself.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("capture worker panicked");
        }
    }

    fn abandon_buffers(&self) {
        if let Err(e) = self.device.reset() {
            log::warn!("failed to reclaim capture buffers: {}", e);
        }
    }
}

impl<D: BufferQueueDevice + 'static> Drop for BufferQueueCapture<D> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn capture_loop(
    device: &dyn BufferQueueDevice,
    sink: &dyn CaptureSink,
    signal: &CaptureSignal,
    stop_requested: &AtomicBool,
    count: usize,
) -> Result<()> {
    let mut next = 0;
    loop {
        signal.wait();
        let stopping = stop_requested.load(Ordering::SeqCst);
        next = drain(device, sink, next, count, !stopping)?;
        if stopping {
            return Ok(());
        }
    }
}

/// Deliver filled buffers in ring order starting at `next`, stopping at the first one
/// the device still holds. Returns the index to resume from.
fn drain(
    device: &dyn BufferQueueDevice,
    sink: &dyn CaptureSink,
    mut next: usize,
    count: usize,
    requeue: bool,
) -> Result<usize> {
    for _ in 0..count {
        let Some(mut buffer) = device.take_filled(next)? else {
            break;
        };
        buffer.mark_delivered();
        log::trace!("buffer {} delivered, {} bytes", buffer.index(), buffer.recorded());
        sink.on_data_available(buffer.data());
        buffer.mark_free();
        if requeue {
            buffer.mark_queued();
            device.queue(buffer)?;
        }
        next = (next + 1) % count;
    }
    Ok(next)
}

/// Deliver buffers the device marked filled while it was being reset.
fn deliver_leftovers(mut leftover: Vec<CaptureBuffer>, sink: &dyn CaptureSink) {
    leftover.retain(|b| b.state() == BufferState::Filled && b.recorded() > 0);
    for mut buffer in leftover {
        buffer.mark_delivered();
        sink.on_data_available(buffer.data());
    }
}
