use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Auto-reset wait signal raised by a device when a queued buffer completes.
///
/// A raise with no waiter is remembered until the next wait, so completions that
/// land between two waits are never lost.
#[derive(Debug, Default)]
pub struct CaptureSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl CaptureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_one();
    }

    /// Block until raised, then reset.
    pub fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.cond.wait(&mut raised);
        }
        *raised = false;
    }

    /// Block until raised or `timeout` elapses. Returns whether the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            self.cond.wait_for(&mut raised, timeout);
        }
        std::mem::replace(&mut *raised, false)
    }
}
