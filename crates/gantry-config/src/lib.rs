//! Shared configuration for the gantry supervisor and its binaries.
//!
//! Values resolve with the precedence command line, then `GANTRY_*`
//! environment variables, then the built-in defaults in [`defaults`]. Parsing
//! is fail-fast: an invalid value anywhere aborts loading with a
//! [`ConfigError`] rather than silently falling back.

use std::ffi::OsString;
use std::time::Duration;

use clap::{ArgAction, Parser};
use serde::Serialize;
use thiserror::Error;

mod address;
pub mod defaults;
mod logging;
mod policy;
mod signals;

pub use address::{AddressParseError, ListenAddress, UNSPECIFIED_HOST};
pub use defaults::{
    DEFAULT_ADDR, DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_FILTER, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    default_exit_policy, default_listen_address, default_log_filter, default_log_format,
    default_shutdown_signals,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use policy::ExitPolicy;
pub use signals::{SignalKind, SignalKindParseError};

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser, Serialize)]
#[command(
    name = "gantry-console",
    version,
    about = "Runs HTTP services under a signal-driven supervisor"
)]
pub struct Config {
    /// Address to listen on, as `host:port` or `:port`.
    #[arg(long, env = "GANTRY_ADDR", default_value = DEFAULT_ADDR)]
    addr: ListenAddress,

    /// Milliseconds to answer "unavailable" before the listener closes.
    #[arg(
        long = "grace-period-ms",
        env = "GANTRY_GRACE_PERIOD_MS",
        default_value_t = DEFAULT_GRACE_PERIOD_MS
    )]
    grace_period_ms: u64,

    /// Milliseconds in-flight requests may keep running after the close.
    #[arg(
        long = "shutdown-timeout-ms",
        env = "GANTRY_SHUTDOWN_TIMEOUT_MS",
        default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_MS
    )]
    shutdown_timeout_ms: u64,

    /// What to do when one service stops on its own: `isolate` or `cascade`.
    #[arg(long, env = "GANTRY_EXIT_POLICY", default_value_t = default_exit_policy())]
    exit_policy: ExitPolicy,

    /// Comma-separated signals that trigger shutdown.
    #[arg(
        long = "signals",
        env = "GANTRY_SIGNALS",
        value_delimiter = ',',
        num_args = 1..,
        default_values_t = default_shutdown_signals()
    )]
    shutdown_signals: Vec<SignalKind>,

    /// Tracing filter expression, for example `info,gantry=debug`.
    #[arg(long, env = "GANTRY_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,

    /// Log output format: `json` or `compact`.
    #[arg(long, env = "GANTRY_LOG_FORMAT", default_value_t = default_log_format())]
    log_format: LogFormat,

    /// Print the banner on startup.
    #[arg(
        long,
        env = "GANTRY_SHOW_BANNER",
        default_value_t = true,
        action = ArgAction::Set
    )]
    show_banner: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    #[serde(skip)]
    show_config: bool,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment input was rejected. Also carries the
    /// `--help` and `--version` displays, which callers print verbatim.
    #[error(transparent)]
    Arguments(#[from] clap::Error),
    /// The signal list resolved to nothing.
    #[error("at least one shutdown signal must be configured")]
    NoShutdownSignals,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list. The first item is
    /// the program name.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_signals.is_empty() {
            return Err(ConfigError::NoShutdownSignals);
        }
        Ok(())
    }

    /// Address the HTTP server listens on.
    #[must_use]
    pub const fn addr(&self) -> &ListenAddress {
        &self.addr
    }

    /// How long the HTTP server drains before closing its listener.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// How long in-flight requests may run after the listener closes.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reaction to a child stopping on its own.
    #[must_use]
    pub const fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    /// Signals that trigger shutdown, never empty once loaded.
    #[must_use]
    pub fn shutdown_signals(&self) -> &[SignalKind] {
        &self.shutdown_signals
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether the binary prints its banner.
    #[must_use]
    pub const fn show_banner(&self) -> bool {
        self.show_banner
    }

    /// Whether the binary prints the configuration and exits.
    #[must_use]
    pub const fn show_config(&self) -> bool {
        self.show_config
    }

    /// Replaces the listen address.
    #[must_use]
    pub fn with_addr(mut self, addr: ListenAddress) -> Self {
        self.addr = addr;
        self
    }

    /// Replaces the log filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_listen_address(),
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            exit_policy: default_exit_policy(),
            shutdown_signals: default_shutdown_signals(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            show_banner: true,
            show_config: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }

    #[test]
    fn serialises_without_show_config_flag() {
        let value = serde_json::to_value(Config::default()).expect("serialise config");
        assert_eq!(value["addr"], "0.0.0.0:8080");
        assert_eq!(value["exit_policy"], "isolate");
        assert_eq!(value["shutdown_signals"][1], "terminate");
        assert!(value.get("show_config").is_none());
    }
}
