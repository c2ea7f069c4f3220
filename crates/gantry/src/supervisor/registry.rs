//! Halt registry shared between a composite's `begin` and `halt`.

use std::mem;
use std::sync::{Arc, Mutex};

use crate::runnable::Unit;
use crate::sync::lock;

/// A launched child awaiting its stop request.
pub(crate) struct Entry {
    pub(crate) name: String,
    pub(crate) unit: Arc<dyn Unit>,
}

#[derive(Default)]
struct RegistryState {
    stopping: bool,
    entries: Vec<Entry>,
}

/// Children registered for halting.
///
/// Registration and the stop snapshot take the same lock, so every child is
/// either registered before the snapshot and halted by it, or refused and
/// never launched.
#[derive(Default)]
pub(crate) struct HaltRegistry {
    state: Mutex<RegistryState>,
}

impl HaltRegistry {
    /// Records a child about to be launched. Returns `false` once stopping
    /// has begun; the caller must not launch the child.
    pub(crate) fn register(&self, name: &str, unit: Arc<dyn Unit>) -> bool {
        let mut state = lock(&self.state);
        if state.stopping {
            return false;
        }
        state.entries.push(Entry {
            name: name.to_owned(),
            unit,
        });
        true
    }

    /// Marks the registry as stopping and hands out every entry exactly once.
    pub(crate) fn stop(&self) -> Vec<Entry> {
        let mut state = lock(&self.state);
        state.stopping = true;
        mem::take(&mut state.entries)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        lock(&self.state).stopping
    }
}
