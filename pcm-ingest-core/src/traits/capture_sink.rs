use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::models::error::IngestError;

/// Receiver of capture notifications.
///
/// All methods are called from the session's worker thread. Data notifications arrive
/// in completion order, and `on_recording_stopped` is called exactly once per session,
/// after the last data notification.
pub trait CaptureSink: Send + Sync {
    /// `data` holds exactly the valid bytes of one completed buffer or drain flush.
    fn on_data_available(&self, data: &[u8]);

    /// The session ended, carrying the fault that ended it, if any.
    fn on_recording_stopped(&self, error: Option<&IngestError>);
}

/// A capture notification as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Data(Vec<u8>),
    Stopped(Option<IngestError>),
}

/// Forwards notifications over a bounded channel.
///
/// Data is offered without blocking the worker; when the consumer falls behind and
/// the channel is full, the buffer is dropped and counted. The stopped event is
/// always delivered.
pub struct ChannelSink {
    tx: Sender<CaptureEvent>,
    dropped_bytes: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<CaptureEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                tx,
                dropped_bytes: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Bytes discarded because the channel was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }
}

impl CaptureSink for ChannelSink {
    fn on_data_available(&self, data: &[u8]) {
        match self.tx.try_send(CaptureEvent::Data(data.to_vec())) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                log::warn!("capture consumer is lagging, dropped {} bytes", data.len());
            }
        }
    }

    fn on_recording_stopped(&self, error: Option<&IngestError>) {
        let _ = self.tx.send(CaptureEvent::Stopped(error.cloned()));
    }
}
