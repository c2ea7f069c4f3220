//! Scripted runnables shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::RunError;
use crate::runnable::{Runnable, Unit};
use crate::sync::{lock, wait_timeout_while, wait_while};

/// What a scripted unit does when `begin` is called.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Behaviour {
    /// Blocks until halted.
    Block,
    /// Returns on its own after the given delay, or earlier if halted.
    Finish(Duration),
    /// Fails immediately.
    FailStart,
    /// Panics immediately.
    PanicStart,
    /// Blocks until halted, then reports a stop failure from `halt`.
    FailStop,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    instantiated: AtomicUsize,
    begun: AtomicUsize,
    halted: AtomicUsize,
}

impl Counters {
    pub(crate) fn instantiated(&self) -> usize {
        self.instantiated.load(Ordering::SeqCst)
    }

    pub(crate) fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub(crate) fn halted(&self) -> usize {
        self.halted.load(Ordering::SeqCst)
    }
}

pub(crate) struct Scripted {
    name: String,
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl Scripted {
    pub(crate) fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_owned(),
            behaviour,
            counters: Arc::default(),
        }
    }

    pub(crate) fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl Runnable for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        self.counters.instantiated.fetch_add(1, Ordering::SeqCst);
        Arc::new(ScriptedUnit {
            behaviour: self.behaviour,
            counters: Arc::clone(&self.counters),
            stopped: Mutex::new(false),
            changed: Condvar::new(),
        })
    }
}

struct ScriptedUnit {
    behaviour: Behaviour,
    counters: Arc<Counters>,
    stopped: Mutex<bool>,
    changed: Condvar,
}

impl Unit for ScriptedUnit {
    fn begin(&self) -> Result<(), RunError> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::FailStart => Err(RunError::other("start failed")),
            Behaviour::PanicStart => panic!("scripted panic"),
            Behaviour::Finish(delay) => {
                let guard = lock(&self.stopped);
                let _ = wait_timeout_while(&self.changed, guard, delay, |stopped| !*stopped);
                Ok(())
            }
            Behaviour::Block | Behaviour::FailStop => {
                let guard = lock(&self.stopped);
                let _guard = wait_while(&self.changed, guard, |stopped| !*stopped);
                Ok(())
            }
        }
    }

    fn halt(&self) -> Result<(), RunError> {
        self.counters.halted.fetch_add(1, Ordering::SeqCst);
        *lock(&self.stopped) = true;
        self.changed.notify_all();
        match self.behaviour {
            Behaviour::FailStop => Err(RunError::other("stop failed")),
            _ => Ok(()),
        }
    }
}

/// Reporter that keeps every event as a compact string such as
/// `stopped:alpha` or `shutdown:signal:terminate`.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    fn record(&self, event: String) {
        lock(&self.events).push(event);
    }
}

impl crate::reporter::LifecycleReporter for Recorder {
    fn unit_starting(&self, unit: &str) {
        self.record(format!("starting:{unit}"));
    }

    fn unit_exited(&self, unit: &str) {
        self.record(format!("exited:{unit}"));
    }

    fn unit_stopped(&self, unit: &str) {
        self.record(format!("stopped:{unit}"));
    }

    fn unit_failed(&self, unit: &str, phase: crate::error::Phase, _error: &RunError) {
        self.record(format!("failed:{unit}:{phase}"));
    }

    fn shutdown_requested(&self, trigger: crate::lifecycle::Trigger) {
        self.record(format!("shutdown:{trigger}"));
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub(crate) fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
