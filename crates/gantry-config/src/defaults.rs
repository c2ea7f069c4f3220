//! Built-in defaults applied when neither the command line nor the
//! environment supplies a value.

use crate::address::ListenAddress;
use crate::logging::LogFormat;
use crate::policy::ExitPolicy;
use crate::signals::SignalKind;

/// Default listen address; every interface on port 8080.
pub const DEFAULT_ADDR: &str = ":8080";

/// Default port used by [`DEFAULT_ADDR`].
pub const DEFAULT_PORT: u16 = 8080;

/// Milliseconds the HTTP adapter keeps answering "unavailable" before closing.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Milliseconds in-flight requests may run once the listener has closed.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default listen address as a typed value.
#[must_use]
pub fn default_listen_address() -> ListenAddress {
    ListenAddress::new(crate::address::UNSPECIFIED_HOST, DEFAULT_PORT)
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default reaction to a child stopping on its own.
#[must_use]
pub const fn default_exit_policy() -> ExitPolicy {
    ExitPolicy::Isolate
}

/// Signals that request shutdown unless configured otherwise.
#[must_use]
pub fn default_shutdown_signals() -> Vec<SignalKind> {
    vec![SignalKind::Interrupt, SignalKind::Terminate]
}
