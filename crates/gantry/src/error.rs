//! Error and failure-report types shared by every runnable.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Lifecycle phase in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The unit's `begin` call.
    Start,
    /// The unit's `halt` call.
    Stop,
}

impl Phase {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors surfaced by `begin` and `halt`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The configured listen address could not be resolved.
    #[error("failed to resolve listen address {address}: {source}")]
    Resolve {
        /// Address as configured.
        address: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no usable address.
    #[error("no TCP addresses resolved for {address}")]
    ResolveEmpty {
        /// Address as configured.
        address: String,
    },
    /// Binding the listener failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        /// Resolved socket address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Requests were still running when the shutdown deadline expired.
    #[error("{remaining} request(s) still in flight after {deadline:?}")]
    ShutdownDeadline {
        /// Requests abandoned at the deadline.
        remaining: usize,
        /// Deadline that expired.
        deadline: Duration,
    },
    /// A unit panicked; the panic was contained.
    #[error("runnable '{unit}' panicked during {phase}: {message}")]
    Panicked {
        /// Name of the runnable.
        unit: String,
        /// Phase that panicked.
        phase: Phase,
        /// Panic payload when it was a string.
        message: String,
    },
    /// A supervisor thread could not be spawned.
    #[error("failed to spawn thread for runnable '{unit}': {source}")]
    Spawn {
        /// Name of the runnable.
        unit: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// One or more children of a composite failed.
    #[error(transparent)]
    Failures(FailureReport),
    /// Failure raised by an application-provided unit.
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl RunError {
    /// Wraps an arbitrary error or message raised by a unit.
    pub fn other(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Other(error.into())
    }
}

/// A single failed `begin` or `halt` inside a composite.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    unit: String,
    phase: Phase,
    error: Arc<RunError>,
}

impl UnitFailure {
    /// Records a failure for the named unit.
    pub fn new(unit: impl Into<String>, phase: Phase, error: RunError) -> Self {
        Self {
            unit: unit.into(),
            phase,
            error: Arc::new(error),
        }
    }

    /// Name of the runnable that failed.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Phase in which it failed.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The error it reported.
    #[must_use]
    pub fn error(&self) -> &RunError {
        &self.error
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({}): {}", self.unit, self.phase, self.error)
    }
}

/// Every failure a composite observed during one phase, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct FailureReport {
    failures: Vec<UnitFailure>,
}

impl FailureReport {
    /// Builds an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failures: Vec::new(),
        }
    }

    /// Appends a failure.
    pub fn push(&mut self, failure: UnitFailure) {
        self.failures.push(failure);
    }

    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Recorded failures in arrival order.
    #[must_use]
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// Returns `true` if the named unit failed in the given phase.
    #[must_use]
    pub fn contains(&self, unit: &str, phase: Phase) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.unit == unit && failure.phase == phase)
    }

    /// `Ok` when empty, otherwise the report as a [`RunError::Failures`].
    pub fn into_result(self) -> Result<(), RunError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RunError::Failures(self))
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} runnable(s) failed", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(formatter, "{separator}{failure}")?;
        }
        Ok(())
    }
}

impl StdError for FailureReport {}
