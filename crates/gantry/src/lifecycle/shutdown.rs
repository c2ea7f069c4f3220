use std::fmt;
use std::io;
use std::os::raw::c_int;
use std::sync::{Condvar, Mutex};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::debug;

use gantry_config::SignalKind;

use crate::reporter::LIFECYCLE_TARGET;
use crate::sync::{lock, wait_while};

/// What caused a supervised run to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A configured termination signal arrived.
    Signal(SignalKind),
    /// A composite child returned and the cascade policy halted its siblings.
    ChildExited,
    /// `begin` returned without any external request.
    Completed,
}

impl fmt::Display for Trigger {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(kind) => write!(formatter, "signal:{kind}"),
            Self::ChildExited => formatter.write_str("child_exited"),
            Self::Completed => formatter.write_str("completed"),
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed. Returns `Ok(None)` once
    /// [`close`](Self::close) has been called without a shutdown request.
    fn wait(&self) -> Result<Option<SignalKind>, ShutdownError>;

    /// Releases any current or future `wait` call.
    fn close(&self);
}

/// Shutdown listener bound to operating system signals.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
    handle: Handle,
}

impl SystemShutdownSignal {
    /// Registers handlers for `kinds`. Handlers stay installed until the
    /// listener is closed.
    pub fn install(kinds: &[SignalKind]) -> Result<Self, ShutdownError> {
        let raw: Vec<c_int> = kinds.iter().copied().map(raw_signal).collect();
        let signals = Signals::new(&raw).map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        debug!(
            target: LIFECYCLE_TARGET,
            signals = ?kinds,
            "signal handlers installed"
        );
        Ok(Self {
            signals: Mutex::new(signals),
            handle,
        })
    }
}

impl fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SystemShutdownSignal")
            .field("closed", &self.handle.is_closed())
            .finish_non_exhaustive()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<Option<SignalKind>, ShutdownError> {
        let mut signals = lock(&self.signals);
        Ok(signals.forever().find_map(signal_kind))
    }

    fn close(&self) {
        self.handle.close();
    }
}

#[derive(Debug, Default)]
struct ManualState {
    requested: Option<SignalKind>,
    closed: bool,
}

/// Shutdown source triggered from code rather than by the operating system.
///
/// Useful for embedding a supervised run inside a larger program, and in
/// tests.
#[derive(Debug, Default)]
pub struct ManualShutdownSignal {
    state: Mutex<ManualState>,
    changed: Condvar,
}

impl ManualShutdownSignal {
    /// Builds an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown as if `kind` had been delivered. Only the first
    /// request is kept.
    pub fn trigger(&self, kind: SignalKind) {
        let mut state = lock(&self.state);
        state.requested.get_or_insert(kind);
        self.changed.notify_all();
    }
}

impl ShutdownSignal for ManualShutdownSignal {
    fn wait(&self) -> Result<Option<SignalKind>, ShutdownError> {
        let guard = lock(&self.state);
        let state = wait_while(&self.changed, guard, |state| {
            state.requested.is_none() && !state.closed
        });
        Ok(state.requested)
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        self.changed.notify_all();
    }
}

impl<T> ShutdownSignal for std::sync::Arc<T>
where
    T: ShutdownSignal + ?Sized,
{
    fn wait(&self) -> Result<Option<SignalKind>, ShutdownError> {
        (**self).wait()
    }

    fn close(&self) {
        (**self).close();
    }
}

pub(crate) const fn raw_signal(kind: SignalKind) -> c_int {
    match kind {
        SignalKind::Interrupt => SIGINT,
        SignalKind::Terminate => SIGTERM,
        SignalKind::Quit => SIGQUIT,
        SignalKind::Hangup => SIGHUP,
    }
}

fn signal_kind(raw: c_int) -> Option<SignalKind> {
    match raw {
        SIGINT => Some(SignalKind::Interrupt),
        SIGTERM => Some(SignalKind::Terminate),
        SIGQUIT => Some(SignalKind::Quit),
        SIGHUP => Some(SignalKind::Hangup),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SignalKind::Interrupt)]
    #[case(SignalKind::Terminate)]
    #[case(SignalKind::Quit)]
    #[case(SignalKind::Hangup)]
    fn raw_numbers_map_back_to_kinds(#[case] kind: SignalKind) {
        assert_eq!(signal_kind(raw_signal(kind)), Some(kind));
    }

    #[test]
    fn manual_signal_keeps_first_request() {
        let signal = ManualShutdownSignal::new();
        signal.trigger(SignalKind::Hangup);
        signal.trigger(SignalKind::Terminate);
        assert_eq!(signal.wait().expect("wait"), Some(SignalKind::Hangup));
    }

    #[test]
    fn closing_releases_a_blocked_wait() {
        let signal = Arc::new(ManualShutdownSignal::new());
        let waiter = {
            let waiting = Arc::clone(&signal);
            thread::spawn(move || waiting.wait())
        };
        signal.close();
        let outcome = waiter.join().expect("join waiter").expect("wait");
        assert_eq!(outcome, None);
    }

    #[test]
    fn system_signal_delivers_raised_signal() {
        let signal = SystemShutdownSignal::install(&[SignalKind::Hangup]).expect("install");
        signal_hook::low_level::raise(SIGHUP).expect("raise SIGHUP");
        assert_eq!(signal.wait().expect("wait"), Some(SignalKind::Hangup));
        signal.close();
        assert_eq!(signal.wait().expect("wait after close"), None);
    }
}
