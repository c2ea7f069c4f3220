//! Runs a runnable until a termination signal arrives.
//!
//! A [`LifecycleSession`] calls `begin` on the caller's thread while a
//! watcher thread waits on a [`ShutdownSignal`]. When the signal fires the
//! watcher calls `halt` exactly once. When `begin` returns on its own the
//! watcher is released without halting.

mod session;
#[cfg(test)]
mod session_tests;
mod shutdown;

pub use self::session::{LifecycleSession, RunSummary, run_until_signal};
pub use self::shutdown::{
    ManualShutdownSignal, ShutdownError, ShutdownSignal, SystemShutdownSignal, Trigger,
};
