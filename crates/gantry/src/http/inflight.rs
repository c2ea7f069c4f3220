//! Counts accepted connections that have not been answered yet.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::sync::{lock, wait_timeout_while};

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    /// Registers one connection; it stays counted until the guard drops.
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        *lock(&self.count) += 1;
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn count(&self) -> usize {
        *lock(&self.count)
    }

    /// Waits up to `deadline` for every connection to finish and returns how
    /// many were still running.
    pub(crate) fn wait_idle(&self, deadline: Duration) -> usize {
        let guard = lock(&self.count);
        let (remaining, _timed_out) =
            wait_timeout_while(&self.idle, guard, deadline, |count| *count > 0);
        *remaining
    }
}

pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = lock(&self.tracker.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.tracker.idle.notify_all();
        }
    }
}
