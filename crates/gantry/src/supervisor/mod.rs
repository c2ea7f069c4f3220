//! Composite supervision of independent runnables.
//!
//! A [`Supervisor`] fans its children out onto one thread each and fans
//! their results back in. The halt registry is the only structure written by
//! several threads at once; see `registry.rs` for the locking discipline.

mod composite;
mod progress;
mod registry;

pub use self::composite::{Supervisor, SupervisorUnit};
pub(crate) use self::composite::contain;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");
