//! waveIn buffer-queue capture device.
//!
//! Opens a waveIn device with a callback function that raises the session's
//! [`CaptureSignal`] on every completed buffer. Buffers handed over by the
//! pipeline are prepared and queued with `waveInAddBuffer`; a buffer comes back
//! once the driver sets `WHDR_DONE` on its header.

use std::ptr::addr_of;
use std::sync::Arc;

use parking_lot::Mutex;
use windows::core::PSTR;
use windows::Win32::Media::Audio::*;

use pcm_ingest_core::models::error::{IngestError, Result};
use pcm_ingest_core::models::format::AudioFormatDescriptor;
use pcm_ingest_core::session::buffers::CaptureBuffer;
use pcm_ingest_core::session::signal::CaptureSignal;
use pcm_ingest_core::traits::buffer_device::BufferQueueDevice;

use crate::error::{mm_check, WindowsAudioError};
use crate::waveformat::to_waveformatex;

const WAVEHDR_LEN: u32 = std::mem::size_of::<WAVEHDR>() as u32;

/// A waveIn device wrapped as a [`BufferQueueDevice`].
pub struct WaveInDevice {
    device_number: u32,
    inner: Mutex<WaveIn>,
}

struct WaveIn {
    handle: Option<HWAVEIN>,
    // `Arc::into_raw` of the signal handed to the driver callback.
    signal: *const CaptureSignal,
    slots: Vec<Option<Slot>>,
}

/// A buffer while the driver holds it. The header points into the buffer's heap
/// region, which does not move with the `CaptureBuffer` value.
struct Slot {
    buffer: CaptureBuffer,
    header: Box<WAVEHDR>,
}

// SAFETY: waveIn handles may be used from any thread, and the headers and buffers
// they reference are only touched under the mutex.
unsafe impl Send for WaveInDevice {}
unsafe impl Sync for WaveInDevice {}

impl WaveInDevice {
    /// The wave mapper, which picks the system default input.
    pub fn default_device() -> Self {
        Self::with_device(WAVE_MAPPER)
    }

    pub fn with_device(device_number: u32) -> Self {
        Self {
            device_number,
            inner: Mutex::new(WaveIn {
                handle: None,
                signal: std::ptr::null(),
                slots: Vec::new(),
            }),
        }
    }

    /// Number of waveIn devices installed.
    pub fn device_count() -> u32 {
        unsafe { waveInGetNumDevs() }
    }
}

impl WaveIn {
    fn handle(&self) -> Result<HWAVEIN> {
        Ok(self.handle.ok_or(WindowsAudioError::State("not open"))?)
    }
}

/// Driver callback. Must not call back into waveIn.
unsafe extern "system" fn wave_in_callback(
    _hwi: HWAVEIN,
    message: u32,
    instance: usize,
    _param1: usize,
    _param2: usize,
) {
    if message == WIM_DATA && instance != 0 {
        let signal = &*(instance as *const CaptureSignal);
        signal.raise();
    }
}

impl BufferQueueDevice for WaveInDevice {
    fn open(&self, format: &AudioFormatDescriptor, signal: Arc<CaptureSignal>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            return Err(IngestError::InvalidOperation("waveIn device is already open".into()));
        }

        let wfx = to_waveformatex(format);
        let signal = Arc::into_raw(signal);
        let mut handle = HWAVEIN::default();
        let code = unsafe {
            waveInOpen(
                Some(&mut handle as *mut _),
                self.device_number,
                wfx.as_ptr() as *const WAVEFORMATEX,
                wave_in_callback as usize,
                signal as usize,
                CALLBACK_FUNCTION,
            )
        };
        if let Err(e) = mm_check("waveInOpen", code) {
            // SAFETY: the driver never saw the pointer.
            drop(unsafe { Arc::from_raw(signal) });
            return Err(e.into());
        }

        log::debug!("opened waveIn device {}", self.device_number);
        inner.handle = Some(handle);
        inner.signal = signal;
        Ok(())
    }

    fn queue(&self, mut buffer: CaptureBuffer) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;

        let region = buffer.as_mut_slice();
        let mut header = Box::new(WAVEHDR {
            lpData: PSTR(region.as_mut_ptr()),
            dwBufferLength: region.len() as u32,
            ..Default::default()
        });
        unsafe {
            mm_check("waveInPrepareHeader", waveInPrepareHeader(handle, &mut *header, WAVEHDR_LEN))?;
            if let Err(e) = mm_check("waveInAddBuffer", waveInAddBuffer(handle, &mut *header, WAVEHDR_LEN)) {
                waveInUnprepareHeader(handle, &mut *header, WAVEHDR_LEN);
                return Err(e.into());
            }
        }

        let index = buffer.index();
        if inner.slots.len() <= index {
            inner.slots.resize_with(index + 1, || None);
        }
        inner.slots[index] = Some(Slot { buffer, header });
        Ok(())
    }

    fn take_filled(&self, index: usize) -> Result<Option<CaptureBuffer>> {
        let mut inner = self.inner.lock();
        let handle = inner.handle()?;
        let Some(slot) = inner.slots.get_mut(index) else {
            return Ok(None);
        };
        let done = match slot {
            Some(s) => unsafe { addr_of!(s.header.dwFlags).read_unaligned() } & WHDR_DONE != 0,
            None => false,
        };
        if !done {
            return Ok(None);
        }

        let Some(Slot { mut buffer, mut header }) = slot.take() else {
            return Ok(None);
        };
        unsafe {
            mm_check("waveInUnprepareHeader", waveInUnprepareHeader(handle, &mut *header, WAVEHDR_LEN))?;
        }
        let recorded = unsafe { addr_of!(header.dwBytesRecorded).read_unaligned() };
        buffer.mark_filled(recorded as usize);
        Ok(Some(buffer))
    }

    fn start(&self) -> Result<()> {
        let inner = self.inner.lock();
        Ok(mm_check("waveInStart", unsafe { waveInStart(inner.handle()?) })?)
    }

    fn stop(&self) -> Result<()> {
        let inner = self.inner.lock();
        let Some(handle) = inner.handle else {
            return Ok(());
        };
        Ok(mm_check("waveInStop", unsafe { waveInStop(handle) })?)
    }

    fn reset(&self) -> Result<Vec<CaptureBuffer>> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle else {
            return Ok(Vec::new());
        };

        // Marks every queued header done and returns it to us.
        mm_check("waveInReset", unsafe { waveInReset(handle) })?;

        let mut returned = Vec::new();
        for Slot { mut buffer, mut header } in inner.slots.iter_mut().filter_map(Option::take) {
            unsafe {
                waveInUnprepareHeader(handle, &mut *header, WAVEHDR_LEN);
            }
            let recorded = unsafe { addr_of!(header.dwBytesRecorded).read_unaligned() } as usize;
            if recorded > 0 {
                buffer.mark_filled(recorded);
            } else {
                buffer.mark_free();
            }
            returned.push(buffer);
        }
        Ok(returned)
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.handle.take() {
            let code = unsafe { waveInClose(handle) };
            if let Err(e) = mm_check("waveInClose", code) {
                log::warn!("{}", e);
            }
            log::debug!("closed waveIn device {}", self.device_number);
        }
        if !inner.signal.is_null() {
            // SAFETY: the device is closed, so the callback no longer runs.
            drop(unsafe { Arc::from_raw(inner.signal) });
            inner.signal = std::ptr::null();
        }
    }
}

impl Drop for WaveInDevice {
    fn drop(&mut self) {
        if self.inner.lock().handle.is_some() {
            let _ = self.reset();
        }
        self.close();
    }
}
