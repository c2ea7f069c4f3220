//! The begin/halt contract every supervised unit of work implements.

use std::sync::Arc;

use crate::error::RunError;
use crate::lifecycle::Trigger;

/// Factory for one independently lifecycled unit of work.
///
/// A runnable is created at composition time and instantiated once when its
/// supervisor starts. The returned [`Unit`] is discarded after its `halt`
/// returns.
pub trait Runnable: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Produces the unit whose `begin` and `halt` refer to the same work.
    fn instantiate(&self) -> Arc<dyn Unit>;
}

/// One instantiation of a [`Runnable`].
///
/// `begin` and `halt` are called from different threads, usually while the
/// other is still running.
pub trait Unit: Send + Sync {
    /// Performs the unit's blocking work.
    ///
    /// Returns `Ok(())` on a clean stop, whether requested through `halt` or
    /// because the work completed. Returns an error when the unit terminated
    /// abnormally, for example because its listener could not be bound.
    fn begin(&self) -> Result<(), RunError>;

    /// Requests termination and blocks until `begin` has returned.
    ///
    /// Must not deadlock or panic when `begin` has not started yet; a `begin`
    /// that starts afterwards observes the request and returns promptly.
    /// Repeated calls are harmless.
    fn halt(&self) -> Result<(), RunError>;

    /// Why `begin` returned without an outside `halt`, when the unit knows
    /// more than [`Trigger::Completed`].
    fn exit_trigger(&self) -> Option<Trigger> {
        None
    }
}

impl<T> Runnable for Arc<T>
where
    T: Runnable + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        (**self).instantiate()
    }
}

impl<T> Runnable for Box<T>
where
    T: Runnable + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        (**self).instantiate()
    }
}

/// Runnable assembled from a factory closure returning a `(begin, halt)`
/// closure pair.
///
/// Useful for small ad-hoc units such as queue pollers. The closures carry
/// the [`Unit`] obligations: `halt` must release a blocked `begin`.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use gantry::{FnRunnable, RunError};
///
/// let ticker = FnRunnable::new("ticker", || {
///     let stop = Arc::new(AtomicBool::new(false));
///     let flag = Arc::clone(&stop);
///     let begin = move || {
///         while !flag.load(Ordering::SeqCst) {
///             std::thread::sleep(std::time::Duration::from_millis(10));
///         }
///         Ok::<(), RunError>(())
///     };
///     let halt = move || {
///         stop.store(true, Ordering::SeqCst);
///         Ok::<(), RunError>(())
///     };
///     (begin, halt)
/// });
/// # let _ = ticker;
/// ```
pub struct FnRunnable<F> {
    name: String,
    factory: F,
}

impl<F> FnRunnable<F> {
    /// Wraps `factory` under the given name.
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl<F, B, H> Runnable for FnRunnable<F>
where
    F: Fn() -> (B, H) + Send + Sync,
    B: Fn() -> Result<(), RunError> + Send + Sync + 'static,
    H: Fn() -> Result<(), RunError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        let (begin, halt) = (self.factory)();
        Arc::new(FnUnit { begin, halt })
    }
}

struct FnUnit<B, H> {
    begin: B,
    halt: H,
}

impl<B, H> Unit for FnUnit<B, H>
where
    B: Fn() -> Result<(), RunError> + Send + Sync,
    H: Fn() -> Result<(), RunError> + Send + Sync,
{
    fn begin(&self) -> Result<(), RunError> {
        (self.begin)()
    }

    fn halt(&self) -> Result<(), RunError> {
        (self.halt)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn fn_runnable_builds_a_fresh_pair_per_instantiation() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let runnable = FnRunnable::new("pair", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let begin = || -> Result<(), RunError> { Ok(()) };
            let halt = || -> Result<(), RunError> { Err(RunError::other("halt failed")) };
            (begin, halt)
        });

        let unit = runnable.instantiate();
        let _second = runnable.instantiate();

        assert_eq!(runnable.name(), "pair");
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(unit.begin().is_ok());
        assert!(unit.halt().is_err());
    }
}
