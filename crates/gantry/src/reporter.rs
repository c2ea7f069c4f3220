//! Structured reporting for supervision lifecycle events.

use std::sync::Arc;

use crate::error::{Phase, RunError};
use crate::lifecycle::Trigger;

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked just before a child's `begin` is called.
    fn unit_starting(&self, unit: &str);

    /// Invoked when a child's `begin` returned cleanly.
    fn unit_exited(&self, unit: &str);

    /// Invoked when a child's `halt` returned cleanly.
    fn unit_stopped(&self, unit: &str);

    /// Invoked for every failed `begin` or `halt`.
    fn unit_failed(&self, unit: &str, phase: Phase, error: &RunError);

    /// Invoked once when shutdown is triggered.
    fn shutdown_requested(&self, trigger: Trigger);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn unit_starting(&self, unit: &str) {
        (**self).unit_starting(unit);
    }

    fn unit_exited(&self, unit: &str) {
        (**self).unit_exited(unit);
    }

    fn unit_stopped(&self, unit: &str) {
        (**self).unit_stopped(unit);
    }

    fn unit_failed(&self, unit: &str, phase: Phase, error: &RunError) {
        (**self).unit_failed(unit, phase, error);
    }

    fn shutdown_requested(&self, trigger: Trigger) {
        (**self).shutdown_requested(trigger);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn unit_starting(&self, unit: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "unit_starting",
            unit,
            "starting runnable"
        );
    }

    fn unit_exited(&self, unit: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "unit_exited",
            unit,
            "runnable finished"
        );
    }

    fn unit_stopped(&self, unit: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "unit_stopped",
            unit,
            "runnable stopped"
        );
    }

    fn unit_failed(&self, unit: &str, phase: Phase, error: &RunError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "unit_failed",
            unit,
            phase = %phase,
            error = %error,
            "runnable failed"
        );
    }

    fn shutdown_requested(&self, trigger: Trigger) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_requested",
            trigger = %trigger,
            "shutdown requested"
        );
    }
}
