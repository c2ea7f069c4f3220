use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use gantry_config::SignalKind;

use super::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal, Trigger};
use crate::error::{Phase, RunError};
use crate::reporter::{LIFECYCLE_TARGET, LifecycleReporter, StructuredLifecycleReporter};
use crate::runnable::{Runnable, Unit};
use crate::supervisor::contain;

/// Outcome of one [`LifecycleSession::run`].
#[derive(Debug)]
pub struct RunSummary {
    trigger: Trigger,
    begin: Result<(), RunError>,
    halt: Option<Result<(), RunError>>,
}

impl RunSummary {
    /// What ended the run.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Result returned by the runnable's `begin`.
    #[must_use]
    pub const fn begin(&self) -> &Result<(), RunError> {
        &self.begin
    }

    /// Result returned by `halt`, if a signal caused it to be called.
    #[must_use]
    pub const fn halt(&self) -> Option<&Result<(), RunError>> {
        self.halt.as_ref()
    }

    /// Returns `true` when neither `begin` nor `halt` failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.begin.is_ok() && self.halt.as_ref().is_none_or(Result::is_ok)
    }
}

#[derive(Debug, Default)]
struct Watch {
    trigger: Option<Trigger>,
    halt: Option<Result<(), RunError>>,
}

/// Drives a single run of a runnable against a shutdown source.
pub struct LifecycleSession<S> {
    signal: S,
    reporter: Arc<dyn LifecycleReporter>,
}

impl<S> LifecycleSession<S>
where
    S: ShutdownSignal,
{
    /// Builds a session listening on `signal`.
    pub fn new(signal: S) -> Self {
        Self {
            signal,
            reporter: Arc::new(StructuredLifecycleReporter::new()),
        }
    }

    /// Routes shutdown events to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Instantiates `runnable` and blocks in its `begin` until it returns.
    ///
    /// A shutdown signal received meanwhile triggers exactly one `halt`.
    /// Failures are logged and returned in the summary; they never abort the
    /// process.
    pub fn run(self, runnable: &dyn Runnable) -> RunSummary {
        let name = runnable.name();
        let unit = runnable.instantiate();
        info!(target: LIFECYCLE_TARGET, unit = name, "lifecycle started");

        let (begin, watch) = thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("gantry-shutdown".to_owned())
                .spawn_scoped(scope, || self.watch(name, unit.as_ref()));
            let watcher = match spawned {
                Ok(handle) => handle,
                Err(source) => {
                    let error = RunError::Spawn {
                        unit: name.to_owned(),
                        source,
                    };
                    error!(
                        target: LIFECYCLE_TARGET,
                        unit = name,
                        error = %error,
                        "cannot watch for shutdown; not starting"
                    );
                    return (Err(error), Watch::default());
                }
            };

            let begin = contain(name, Phase::Start, || unit.begin());
            if let Err(error) = &begin {
                error!(
                    target: LIFECYCLE_TARGET,
                    unit = name,
                    error = %error,
                    "runnable failed"
                );
            }
            self.signal.close();
            let watch = watcher.join().unwrap_or_else(|_| {
                warn!(target: LIFECYCLE_TARGET, unit = name, "shutdown watcher panicked");
                Watch::default()
            });
            (begin, watch)
        });

        let trigger = watch
            .trigger
            .or_else(|| unit.exit_trigger())
            .unwrap_or(Trigger::Completed);
        info!(
            target: LIFECYCLE_TARGET,
            unit = name,
            trigger = %trigger,
            "lifecycle finished"
        );
        RunSummary {
            trigger,
            begin,
            halt: watch.halt,
        }
    }

    fn watch(&self, name: &str, unit: &dyn Unit) -> Watch {
        let kind = match self.signal.wait() {
            Ok(Some(kind)) => kind,
            Ok(None) => return Watch::default(),
            Err(error) => {
                error!(
                    target: LIFECYCLE_TARGET,
                    error = %error,
                    "shutdown listener failed"
                );
                return Watch::default();
            }
        };
        let trigger = Trigger::Signal(kind);
        self.reporter.shutdown_requested(trigger);
        let halt = contain(name, Phase::Stop, || unit.halt());
        if let Err(error) = &halt {
            error!(
                target: LIFECYCLE_TARGET,
                unit = name,
                error = %error,
                "halt failed"
            );
        }
        Watch {
            trigger: Some(trigger),
            halt: Some(halt),
        }
    }
}

/// Installs handlers for `signals` and runs `runnable` until one arrives or
/// `begin` returns.
pub fn run_until_signal(
    runnable: &dyn Runnable,
    signals: &[SignalKind],
) -> Result<RunSummary, ShutdownError> {
    let signal = SystemShutdownSignal::install(signals)?;
    Ok(LifecycleSession::new(signal).run(runnable))
}
