/// Who holds a capture buffer, and what it holds.
///
/// ```text
/// free → queued_to_device → filled → delivered_to_consumer → free
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Free,
    QueuedToDevice,
    Filled,
    DeliveredToConsumer,
}

/// A fixed-capacity byte region cycled between the capture pipeline and a device.
///
/// Ownership transfer is a move: whoever holds the value owns the bytes, and the
/// state tag records which step of the cycle the buffer is in.
#[derive(Debug)]
pub struct CaptureBuffer {
    index: usize,
    data: Box<[u8]>,
    recorded: usize,
    state: BufferState,
}

impl CaptureBuffer {
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            data: vec![0u8; capacity].into_boxed_slice(),
            recorded: 0,
            state: BufferState::Free,
        }
    }

    /// Position of this buffer in the pipeline's ring, `0..N`.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Bytes the device reported as recorded.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// The recorded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.recorded]
    }

    /// The whole region, for the device to write into while it holds the buffer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert_eq!(self.state, BufferState::QueuedToDevice);
        &mut self.data
    }

    /// Device side: the buffer now holds `recorded` valid bytes.
    pub fn mark_filled(&mut self, recorded: usize) {
        debug_assert_eq!(self.state, BufferState::QueuedToDevice);
        self.recorded = recorded.min(self.data.len());
        self.state = BufferState::Filled;
    }

    /// Device side: copy `bytes` in and mark filled. Returns the number of bytes taken.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.capacity());
        self.as_mut_slice()[..n].copy_from_slice(&bytes[..n]);
        self.mark_filled(n);
        n
    }

    pub(crate) fn mark_queued(&mut self) {
        debug_assert!(matches!(self.state, BufferState::Free));
        self.recorded = 0;
        self.state = BufferState::QueuedToDevice;
    }

    pub(crate) fn mark_delivered(&mut self) {
        debug_assert_eq!(self.state, BufferState::Filled);
        self.state = BufferState::DeliveredToConsumer;
    }

    /// Return to `Free` from any state; used when the device hands back unfilled buffers.
    pub fn mark_free(&mut self) {
        self.recorded = 0;
        self.state = BufferState::Free;
    }
}
