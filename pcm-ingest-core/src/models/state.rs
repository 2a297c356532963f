/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → initialized → recording → stopping → stopped
///                          ↑                     │
///                          └─────── start ───────┘
/// any state ── dispose ──→ disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Initialized,
    Recording,
    Stopping,
    Stopped,
    Disposed,
}

impl CaptureState {
    /// Whether `start()` is legal from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Initialized | Self::Stopped)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resting_states_can_start() {
        assert!(CaptureState::Idle.can_start());
        assert!(CaptureState::Initialized.can_start());
        assert!(CaptureState::Stopped.can_start());
        assert!(!CaptureState::Recording.can_start());
        assert!(!CaptureState::Stopping.can_start());
        assert!(!CaptureState::Disposed.can_start());
    }
}
