//! Start and finish tracking for a composite's `begin`.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::sync::{lock, wait_timeout_while, wait_while};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Launching,
    Running,
    Finished,
}

#[derive(Debug)]
struct State {
    stage: Stage,
    launched: usize,
    invoked: usize,
}

impl State {
    fn started(&self) -> bool {
        match self.stage {
            Stage::Idle | Stage::Launching => false,
            Stage::Running => self.invoked >= self.launched,
            Stage::Finished => true,
        }
    }

    fn in_flight(&self) -> bool {
        matches!(self.stage, Stage::Launching | Stage::Running)
    }
}

/// Latch observed by readiness probes and by `halt`.
#[derive(Debug)]
pub(crate) struct Progress {
    state: Mutex<State>,
    changed: Condvar,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                stage: Stage::Idle,
                launched: 0,
                invoked: 0,
            }),
            changed: Condvar::new(),
        }
    }
}

impl Progress {
    /// Claims the single `begin` call. Returns `false` if it was already made.
    pub(crate) fn claim(&self) -> bool {
        let mut state = lock(&self.state);
        if state.stage != Stage::Idle {
            return false;
        }
        state.stage = Stage::Launching;
        true
    }

    /// Called by a child thread immediately before it invokes `begin`.
    pub(crate) fn invoked(&self) {
        let mut state = lock(&self.state);
        state.invoked += 1;
        self.changed.notify_all();
    }

    /// Closes the launch phase once `count` children have been spawned.
    pub(crate) fn launched(&self, count: usize) {
        let mut state = lock(&self.state);
        state.launched = count;
        state.stage = Stage::Running;
        self.changed.notify_all();
    }

    pub(crate) fn finish(&self) {
        let mut state = lock(&self.state);
        state.stage = Stage::Finished;
        self.changed.notify_all();
    }

    /// Waits until every launched child has had `begin` invoked.
    pub(crate) fn wait_started(&self, timeout: Duration) -> bool {
        let guard = lock(&self.state);
        let (_guard, timed_out) =
            wait_timeout_while(&self.changed, guard, timeout, |state| !state.started());
        !timed_out
    }

    /// Blocks while a `begin` call is in flight. Returns immediately if
    /// `begin` never ran or already returned.
    pub(crate) fn wait_finished(&self) {
        let guard = lock(&self.state);
        let _guard = wait_while(&self.changed, guard, |state| state.in_flight());
    }

    pub(crate) fn launched_count(&self) -> usize {
        lock(&self.state).launched
    }
}
