//! Unit tests for the lifecycle session.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gantry_config::{ExitPolicy, SignalKind};
use rstest::{fixture, rstest};

use super::{LifecycleSession, ManualShutdownSignal, Trigger, run_until_signal};
use crate::error::RunError;
use crate::supervisor::Supervisor;
use crate::test_support::{Behaviour, Recorder, Scripted, eventually};

const PATIENCE: Duration = Duration::from_secs(5);

#[fixture]
fn signal() -> Arc<ManualShutdownSignal> {
    Arc::new(ManualShutdownSignal::new())
}

#[rstest]
fn signal_halts_the_running_unit_once(signal: Arc<ManualShutdownSignal>) {
    let runnable = Scripted::new("worker", Behaviour::Block);
    let counters = runnable.counters();
    let session = LifecycleSession::new(Arc::clone(&signal));

    let summary = thread::scope(|scope| {
        let runner = scope.spawn(|| session.run(&runnable));
        assert!(eventually(PATIENCE, || counters.begun() == 1));
        signal.trigger(SignalKind::Terminate);
        runner.join().expect("join session")
    });

    assert_eq!(summary.trigger(), Trigger::Signal(SignalKind::Terminate));
    assert!(summary.is_clean());
    assert!(summary.halt().is_some());
    assert_eq!(counters.halted(), 1);
}

#[rstest]
fn self_terminating_unit_is_not_halted(signal: Arc<ManualShutdownSignal>) {
    let runnable = Scripted::new("job", Behaviour::Finish(Duration::from_millis(10)));
    let counters = runnable.counters();

    let summary = LifecycleSession::new(signal).run(&runnable);

    assert_eq!(summary.trigger(), Trigger::Completed);
    assert!(summary.halt().is_none());
    assert!(summary.is_clean());
    assert_eq!(counters.halted(), 0);
}

#[rstest]
fn begin_failure_is_returned_not_raised(signal: Arc<ManualShutdownSignal>) {
    let runnable = Scripted::new("broken", Behaviour::FailStart);

    let summary = LifecycleSession::new(signal).run(&runnable);

    assert_eq!(summary.trigger(), Trigger::Completed);
    assert!(matches!(summary.begin(), Err(RunError::Other(_))));
    assert!(!summary.is_clean());
}

#[rstest]
fn signal_before_run_still_stops_the_unit(signal: Arc<ManualShutdownSignal>) {
    let runnable = Scripted::new("late", Behaviour::Block);
    signal.trigger(SignalKind::Interrupt);

    let summary = LifecycleSession::new(signal).run(&runnable);

    assert_eq!(summary.trigger(), Trigger::Signal(SignalKind::Interrupt));
    assert!(summary.is_clean());
}

#[rstest]
fn halt_failure_is_reported(signal: Arc<ManualShutdownSignal>) {
    let runnable = Scripted::new("stubborn", Behaviour::FailStop);
    let counters = runnable.counters();
    let session = LifecycleSession::new(Arc::clone(&signal));

    let summary = thread::scope(|scope| {
        let runner = scope.spawn(|| session.run(&runnable));
        assert!(eventually(PATIENCE, || counters.begun() == 1));
        signal.trigger(SignalKind::Terminate);
        runner.join().expect("join session")
    });

    assert!(summary.begin().is_ok());
    assert!(matches!(summary.halt(), Some(Err(_))));
    assert!(!summary.is_clean());
}

#[rstest]
fn signal_stops_every_child_of_a_supervisor(signal: Arc<ManualShutdownSignal>) {
    let left = Scripted::new("left", Behaviour::Block);
    let right = Scripted::new("right", Behaviour::Block);
    let counters = [left.counters(), right.counters()];
    let recorder = Arc::new(Recorder::default());
    let supervisor = Supervisor::new()
        .with_reporter(recorder.clone())
        .with_child(left)
        .with_child(right);
    let session = LifecycleSession::new(Arc::clone(&signal)).with_reporter(recorder.clone());

    let summary = thread::scope(|scope| {
        let runner = scope.spawn(|| session.run(&supervisor));
        assert!(eventually(PATIENCE, || {
            counters.iter().all(|counter| counter.begun() == 1)
        }));
        signal.trigger(SignalKind::Terminate);
        runner.join().expect("join session")
    });

    assert!(summary.is_clean());
    assert!(counters.iter().all(|counter| counter.halted() == 1));
    let events = recorder.events();
    assert!(events.contains(&"shutdown:signal:terminate".to_owned()));
    assert!(events.contains(&"stopped:left".to_owned()));
    assert!(events.contains(&"stopped:right".to_owned()));
}

#[rstest]
fn cascading_supervisor_reports_child_exit(signal: Arc<ManualShutdownSignal>) {
    let finisher = Scripted::new("a", Behaviour::Finish(Duration::from_millis(20)));
    let server = Scripted::new("b", Behaviour::Block);
    let server_counters = server.counters();
    let supervisor = Supervisor::new()
        .with_policy(ExitPolicy::Cascade)
        .with_child(finisher)
        .with_child(server);

    let summary = LifecycleSession::new(signal).run(&supervisor);

    assert_eq!(summary.trigger(), Trigger::ChildExited);
    assert!(summary.halt().is_none(), "no outside halt was issued");
    assert_eq!(server_counters.halted(), 1);
}

#[rstest]
fn run_until_signal_returns_when_the_unit_completes() {
    let runnable = Scripted::new("batch", Behaviour::Finish(Duration::from_millis(10)));

    let summary = run_until_signal(&runnable, &[SignalKind::Quit]).expect("install handlers");

    assert_eq!(summary.trigger(), Trigger::Completed);
    assert!(summary.is_clean());
}
