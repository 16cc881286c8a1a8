use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// "Something new is in a cache" flag shared between download workers and
/// the render loop.
///
/// Raising an already-raised signal is a no-op, so any number of completed
/// downloads between two frames collapse into one redraw.
#[derive(Debug, Default)]
pub struct RedrawSignal {
    dirty: Mutex<bool>,
    cond: Condvar,
}

impl RedrawSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let mut dirty = self.dirty.lock();
        if !*dirty {
            *dirty = true;
            self.cond.notify_all();
        }
    }

    /// Return and clear the flag. Never blocks; called once per frame.
    pub fn take(&self) -> bool {
        std::mem::take(&mut *self.dirty.lock())
    }

    pub fn is_raised(&self) -> bool {
        *self.dirty.lock()
    }

    /// Block until the flag is raised or `timeout` passes, then clear it.
    /// Returns whether it was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut dirty = self.dirty.lock();
        while !*dirty {
            if self.cond.wait_until(&mut dirty, deadline).timed_out() {
                break;
            }
        }
        std::mem::take(&mut *dirty)
    }
}
