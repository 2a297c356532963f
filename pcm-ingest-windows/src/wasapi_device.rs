//! WASAPI polling capture device.
//!
//! Wraps one `IAudioClient` on a capture endpoint (microphone) or a render endpoint
//! (loopback of the system mix). Drives the polling capture loop in
//! `pcm_ingest_core::PollingCapture`.

use std::time::Duration;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{RPC_E_CHANGED_MODE, S_OK};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use pcm_ingest_core::models::config::{ShareMode, StreamMode};
use pcm_ingest_core::models::error::Result;
use pcm_ingest_core::models::format::AudioFormatDescriptor;
use pcm_ingest_core::traits::polling_device::{CapturePacket, PollingCaptureDevice};

use crate::error::{ComContext, WindowsAudioError};
use crate::waveformat::{from_waveformatex, to_waveformatex};

/// WASAPI endpoint wrapped as a [`PollingCaptureDevice`].
///
/// For loopback, open the render endpoint and configure the session with
/// `StreamMode::Loopback`.
pub struct WasapiDevice {
    name: String,
    client: Mutex<Option<Client>>,
}

struct Client {
    audio_client: IAudioClient,
    stream: Option<Stream>,
}

struct Stream {
    capture_client: IAudioCaptureClient,
    block_align: usize,
}

// SAFETY: WASAPI client interfaces are free-threaded, and every use goes through
// the mutex.
unsafe impl Send for WasapiDevice {}
unsafe impl Sync for WasapiDevice {}

impl WasapiDevice {
    /// The system default microphone.
    pub fn default_capture() -> Result<Self> {
        Self::activate("Default Microphone", |e| unsafe { e.GetDefaultAudioEndpoint(eCapture, eConsole) })
    }

    /// The system default output, for loopback capture.
    pub fn default_render() -> Result<Self> {
        Self::activate("System Audio (Loopback)", |e| unsafe {
            e.GetDefaultAudioEndpoint(eRender, eConsole)
        })
    }

    /// A specific endpoint by MMDevice ID.
    pub fn with_device_id(id: &str) -> Result<Self> {
        let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        Self::activate(id, |e| unsafe { e.GetDevice(PCWSTR(wide_id.as_ptr())) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn activate(
        name: &str,
        endpoint: impl FnOnce(&IMMDeviceEnumerator) -> windows::core::Result<IMMDevice>,
    ) -> Result<Self> {
        unsafe {
            // COM stays initialized on this thread. Other threads reach the client
            // through the process MTA.
            let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
            if hr.is_err() && hr != RPC_E_CHANGED_MODE {
                return Err(WindowsAudioError::Com {
                    call: "CoInitializeEx",
                    source: hr.into(),
                }
                .into());
            }

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).context("CoCreateInstance")?;
            let device = endpoint(&enumerator).context("endpoint lookup")?;
            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).context("IMMDevice::Activate")?;

            log::debug!("activated WASAPI endpoint '{}'", name);
            Ok(Self {
                name: name.to_string(),
                client: Mutex::new(Some(Client {
                    audio_client,
                    stream: None,
                })),
            })
        }
    }

    fn with_client<T>(&self, f: impl FnOnce(&mut Client) -> Result<T>) -> Result<T> {
        let mut guard = self.client.lock();
        let client = guard.as_mut().ok_or(WindowsAudioError::State("released"))?;
        f(client)
    }

    fn with_stream<T>(&self, f: impl FnOnce(&IAudioClient, &Stream) -> Result<T>) -> Result<T> {
        self.with_client(|client| {
            let stream = client
                .stream
                .as_ref()
                .ok_or(WindowsAudioError::State("not initialized"))?;
            f(&client.audio_client, stream)
        })
    }
}

impl PollingCaptureDevice for WasapiDevice {
    fn mix_format(&self) -> Result<AudioFormatDescriptor> {
        self.with_client(|client| unsafe {
            let ptr = client.audio_client.GetMixFormat().context("IAudioClient::GetMixFormat")?;
            let format = from_waveformatex(ptr);
            CoTaskMemFree(Some(ptr as *const _));
            format
        })
    }

    fn is_format_supported(&self, share_mode: ShareMode, format: &AudioFormatDescriptor) -> bool {
        let bytes = to_waveformatex(format);
        self.with_client(|client| unsafe {
            let mut closest: *mut WAVEFORMATEX = std::ptr::null_mut();
            let hr = client.audio_client.IsFormatSupported(
                share_mode_flag(share_mode),
                bytes.as_ptr() as *const WAVEFORMATEX,
                Some(&mut closest as *mut _),
            );
            if !closest.is_null() {
                CoTaskMemFree(Some(closest as *const _));
            }
            Ok(hr == S_OK)
        })
        .unwrap_or(false)
    }

    fn initialize(
        &self,
        share_mode: ShareMode,
        stream_mode: StreamMode,
        buffer_duration: Duration,
        format: &AudioFormatDescriptor,
    ) -> Result<()> {
        let bytes = to_waveformatex(format);
        // REFERENCE_TIME is in 100 ns units.
        let hns = (buffer_duration.as_nanos() / 100) as i64;
        let periodicity = match share_mode {
            ShareMode::Shared => 0,
            ShareMode::Exclusive => hns,
        };
        let flags = match stream_mode {
            StreamMode::Capture => AUDCLNT_STREAMFLAGS_NOPERSIST,
            StreamMode::Loopback => AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
        };

        self.with_client(|client| unsafe {
            client
                .audio_client
                .Initialize(
                    share_mode_flag(share_mode),
                    flags,
                    hns,
                    periodicity,
                    bytes.as_ptr() as *const WAVEFORMATEX,
                    None,
                )
                .context("IAudioClient::Initialize")?;
            let capture_client: IAudioCaptureClient =
                client.audio_client.GetService().context("IAudioClient::GetService")?;
            client.stream = Some(Stream {
                capture_client,
                block_align: format.block_align() as usize,
            });
            Ok(())
        })
    }

    fn buffer_frame_count(&self) -> Result<u32> {
        self.with_stream(|audio_client, _| unsafe {
            Ok(audio_client.GetBufferSize().context("IAudioClient::GetBufferSize")?)
        })
    }

    fn start(&self) -> Result<()> {
        self.with_stream(|audio_client, _| unsafe { Ok(audio_client.Start().context("IAudioClient::Start")?) })
    }

    fn stop(&self) -> Result<()> {
        self.with_stream(|audio_client, _| unsafe { Ok(audio_client.Stop().context("IAudioClient::Stop")?) })
    }

    fn next_packet_frames(&self) -> Result<u32> {
        self.with_stream(|_, stream| unsafe {
            Ok(stream
                .capture_client
                .GetNextPacketSize()
                .context("IAudioCaptureClient::GetNextPacketSize")?)
        })
    }

    fn read_packet(&self, visit: &mut dyn FnMut(CapturePacket<'_>)) -> Result<()> {
        self.with_stream(|_, stream| unsafe {
            let mut data: *mut u8 = std::ptr::null_mut();
            let mut frames: u32 = 0;
            let mut flags: u32 = 0;
            stream
                .capture_client
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .context("IAudioCaptureClient::GetBuffer")?;

            let bytes = if data.is_null() {
                &[][..]
            } else {
                std::slice::from_raw_parts(data, frames as usize * stream.block_align)
            };
            visit(CapturePacket {
                data: bytes,
                frames,
                silent: flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0,
            });

            Ok(stream
                .capture_client
                .ReleaseBuffer(frames)
                .context("IAudioCaptureClient::ReleaseBuffer")?)
        })
    }

    fn release(&self) {
        if self.client.lock().take().is_some() {
            log::debug!("released WASAPI endpoint '{}'", self.name);
        }
    }
}

fn share_mode_flag(share_mode: ShareMode) -> AUDCLNT_SHAREMODE {
    match share_mode {
        ShareMode::Shared => AUDCLNT_SHAREMODE_SHARED,
        ShareMode::Exclusive => AUDCLNT_SHAREMODE_EXCLUSIVE,
    }
}
