//! Process lifecycle supervision.
//!
//! Gantry starts a set of independent, blocking units of work together and
//! stops them together. Every unit implements the [`Runnable`] contract: a
//! factory whose [`Unit`] exposes a blocking `begin` and a `halt` that
//! requests termination and waits for `begin` to return.
//!
//! The pieces compose leaf-first:
//!
//! - [`Supervisor`] fans out to child runnables on their own threads and
//!   aggregates per-child failures into a [`FailureReport`]. Whether one child
//!   stopping on its own halts its siblings is an explicit
//!   [`ExitPolicy`](gantry_config::ExitPolicy).
//! - [`LifecycleSession`] calls `begin` on the caller's thread and halts the
//!   runnable once a [`ShutdownSignal`] fires.
//! - [`HttpServer`] is a runnable over a TCP listener that drains on halt:
//!   new requests get `503` during a grace period, then the listener closes
//!   and in-flight requests may finish up to a deadline.
//!
//! Errors from children are logged and returned, never raised as panics, so
//! a failing component cannot take the rest of the process down.

mod error;
pub mod http;
pub mod lifecycle;
mod reporter;
mod runnable;
mod supervisor;
mod sync;
pub mod telemetry;

pub use error::{FailureReport, Phase, RunError, UnitFailure};
pub use http::{HttpServer, HttpServerConfig, HttpServerUnit, RequestHandler, ServerState};
pub use lifecycle::{
    LifecycleSession, ManualShutdownSignal, RunSummary, ShutdownError, ShutdownSignal,
    SystemShutdownSignal, Trigger, run_until_signal,
};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use runnable::{FnRunnable, Runnable, Unit};
pub use supervisor::{Supervisor, SupervisorUnit};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;
