//! Composite runnable that starts and stops its children concurrently.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, Scope};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use gantry_config::ExitPolicy;

use crate::error::{FailureReport, Phase, RunError, UnitFailure};
use crate::lifecycle::Trigger;
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};
use crate::runnable::{Runnable, Unit};

use super::SUPERVISOR_TARGET;
use super::progress::Progress;
use super::registry::{Entry, HaltRegistry};

const DEFAULT_NAME: &str = "supervisor";

/// Combines independent runnables into one.
///
/// `begin` launches every child on its own thread and returns once all of
/// them have returned; `halt` stops every launched child concurrently. There
/// is no ordering between children. Failures are reported per child and
/// aggregated into a [`FailureReport`].
pub struct Supervisor {
    name: String,
    children: Vec<Arc<dyn Runnable>>,
    policy: ExitPolicy,
    reporter: Arc<dyn LifecycleReporter>,
}

impl Supervisor {
    /// Builds an empty supervisor with the isolate policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            children: Vec::new(),
            policy: ExitPolicy::default(),
            reporter: Arc::new(StructuredLifecycleReporter::new()),
        }
    }

    /// Appends a child. Children are listed in reports in insertion order.
    #[must_use]
    pub fn with_child(mut self, child: impl Runnable + 'static) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// Appends already shared children.
    #[must_use]
    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Runnable>>,
    {
        self.children.extend(children);
        self
    }

    /// Chooses how a child stopping on its own affects its siblings.
    #[must_use]
    pub fn with_policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Routes lifecycle events to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Renames the supervisor, for nesting composites.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` when there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Instantiates the supervisor, keeping the concrete unit type so callers
    /// can probe readiness.
    #[must_use]
    pub fn start(&self) -> Arc<SupervisorUnit> {
        Arc::new(SupervisorUnit {
            name: self.name.clone(),
            children: self.children.clone(),
            policy: self.policy,
            reporter: Arc::clone(&self.reporter),
            registry: HaltRegistry::default(),
            progress: Progress::default(),
            halted: OnceCell::new(),
            cascaded: AtomicBool::new(false),
        })
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Runnable for Supervisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        self.start()
    }
}

struct Completion {
    unit: String,
    result: Result<(), RunError>,
}

/// One instantiation of a [`Supervisor`].
pub struct SupervisorUnit {
    name: String,
    children: Vec<Arc<dyn Runnable>>,
    policy: ExitPolicy,
    reporter: Arc<dyn LifecycleReporter>,
    registry: HaltRegistry,
    progress: Progress,
    halted: OnceCell<FailureReport>,
    cascaded: AtomicBool,
}

impl SupervisorUnit {
    /// Waits until `begin` has launched its children and each of them has had
    /// its own `begin` invoked. Returns `false` on timeout.
    ///
    /// Also returns `true` once `begin` has finished, including the case where
    /// a halt arrived first and nothing was launched.
    #[must_use]
    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.progress.wait_started(timeout)
    }

    /// Number of children launched by `begin` so far.
    #[must_use]
    pub fn launched(&self) -> usize {
        self.progress.launched_count()
    }

    fn launch<'scope>(
        &'scope self,
        scope: &'scope Scope<'scope, '_>,
        done: &Sender<Completion>,
        report: &mut FailureReport,
    ) -> usize {
        let mut launched = 0;
        for child in &self.children {
            let name = child.name().to_owned();
            let unit = child.instantiate();
            if !self.registry.register(&name, Arc::clone(&unit)) {
                debug!(
                    target: SUPERVISOR_TARGET,
                    supervisor = %self.name,
                    unit = %name,
                    "halt already requested; child not launched"
                );
                break;
            }
            let sender = done.clone();
            let thread_name = name.clone();
            let spawned = thread::Builder::new()
                .name(format!("gantry-{thread_name}"))
                .spawn_scoped(scope, move || {
                    self.progress.invoked();
                    self.reporter.unit_starting(&name);
                    let result = contain(&name, Phase::Start, || unit.begin());
                    // The receiver lives until the scope closes.
                    let _ = sender.send(Completion { unit: name, result });
                });
            match spawned {
                Ok(_) => launched += 1,
                Err(source) => {
                    let error = RunError::Spawn {
                        unit: thread_name.clone(),
                        source,
                    };
                    self.reporter.unit_failed(&thread_name, Phase::Start, &error);
                    report.push(UnitFailure::new(thread_name, Phase::Start, error));
                }
            }
        }
        launched
    }

    fn collect(&self, completions: mpsc::Receiver<Completion>, report: &mut FailureReport) {
        for Completion { unit, result } in completions {
            match result {
                Ok(()) => self.reporter.unit_exited(&unit),
                Err(error) => {
                    self.reporter.unit_failed(&unit, Phase::Start, &error);
                    report.push(UnitFailure::new(unit.clone(), Phase::Start, error));
                }
            }
            if self.policy.cascades() && !self.registry.is_stopping() {
                info!(
                    target: SUPERVISOR_TARGET,
                    supervisor = %self.name,
                    unit = %unit,
                    "child exited; halting siblings"
                );
                self.cascaded.store(true, Ordering::SeqCst);
                self.reporter.shutdown_requested(Trigger::ChildExited);
                // Cascaded stop failures are surfaced to later `halt` callers.
                let _ = self.halt_once();
            }
        }
    }

    fn halt_once(&self) -> &FailureReport {
        self.halted.get_or_init(|| self.halt_children())
    }

    fn halt_children(&self) -> FailureReport {
        let entries = self.registry.stop();
        info!(
            target: SUPERVISOR_TARGET,
            supervisor = %self.name,
            children = entries.len(),
            "halting children"
        );
        let mut report = FailureReport::new();
        thread::scope(|scope| {
            let pending: Vec<_> = entries
                .iter()
                .map(|entry| (entry, spawn_halt(scope, entry)))
                .collect();
            for (entry, spawned) in pending {
                let result = match spawned {
                    Some(handle) => handle.join().unwrap_or_else(|payload| {
                        Err(panicked(&entry.name, Phase::Stop, payload.as_ref()))
                    }),
                    None => contain(&entry.name, Phase::Stop, || entry.unit.halt()),
                };
                match result {
                    Ok(()) => self.reporter.unit_stopped(&entry.name),
                    Err(error) => {
                        self.reporter.unit_failed(&entry.name, Phase::Stop, &error);
                        report.push(UnitFailure::new(entry.name.clone(), Phase::Stop, error));
                    }
                }
            }
        });
        report
    }
}

impl Unit for SupervisorUnit {
    fn begin(&self) -> Result<(), RunError> {
        if !self.progress.claim() {
            warn!(
                target: SUPERVISOR_TARGET,
                supervisor = %self.name,
                "begin called more than once; ignoring"
            );
            return Ok(());
        }
        let mut report = FailureReport::new();
        thread::scope(|scope| {
            let (done, completions) = mpsc::channel();
            let launched = self.launch(scope, &done, &mut report);
            drop(done);
            self.progress.launched(launched);
            info!(
                target: SUPERVISOR_TARGET,
                supervisor = %self.name,
                launched,
                "children launched"
            );
            self.collect(completions, &mut report);
        });
        self.progress.finish();
        report.into_result()
    }

    fn halt(&self) -> Result<(), RunError> {
        let report = self.halt_once().clone();
        self.progress.wait_finished();
        report.into_result()
    }

    fn exit_trigger(&self) -> Option<Trigger> {
        self.cascaded
            .load(Ordering::SeqCst)
            .then_some(Trigger::ChildExited)
    }
}

fn spawn_halt<'scope>(
    scope: &'scope Scope<'scope, '_>,
    entry: &'scope Entry,
) -> Option<thread::ScopedJoinHandle<'scope, Result<(), RunError>>> {
    let spawned = thread::Builder::new()
        .name(format!("gantry-halt-{}", entry.name))
        .spawn_scoped(scope, move || {
            contain(&entry.name, Phase::Stop, || entry.unit.halt())
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(error) => {
            // Falls back to halting on the caller's thread.
            warn!(
                target: SUPERVISOR_TARGET,
                unit = %entry.name,
                error = %error,
                "failed to spawn halt thread"
            );
            None
        }
    }
}

/// Runs a unit operation, converting a panic into [`RunError::Panicked`].
pub(crate) fn contain(
    unit: &str,
    phase: Phase,
    operation: impl FnOnce() -> Result<(), RunError>,
) -> Result<(), RunError> {
    panic::catch_unwind(AssertUnwindSafe(operation))
        .unwrap_or_else(|payload| Err(panicked(unit, phase, payload.as_ref())))
}

fn panicked(unit: &str, phase: Phase, payload: &(dyn Any + Send)) -> RunError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    RunError::Panicked {
        unit: unit.to_owned(),
        phase,
        message,
    }
}
