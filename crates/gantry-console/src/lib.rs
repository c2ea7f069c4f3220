//! Runtime for the `gantry-console` binary.
//!
//! Loads configuration, handles the informational flags (`--version`,
//! `--show-config`, the banner), installs telemetry and then runs an HTTP
//! server under the composite supervisor until a configured shutdown signal
//! arrives. Failures of the supervised services are logged; only
//! configuration, telemetry and signal installation failures produce a
//! non-zero exit code.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::error::ErrorKind;
use thiserror::Error;
use tracing::{info, warn};

use gantry::http::{Request, Response};
use gantry::{
    HttpServer, HttpServerConfig, LifecycleSession, RunSummary, ShutdownError, Supervisor,
    SystemShutdownSignal, TelemetryError, telemetry,
};
use gantry_config::{Config, ConfigError};

const CONSOLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::console");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that stop the console before or instead of serving.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Signal handlers could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// The effective configuration could not be serialised.
    #[error("failed to render configuration: {0}")]
    Render(#[from] serde_json::Error),
    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// How a successful invocation ended.
#[derive(Debug)]
pub enum Outcome {
    /// An informational flag was handled and nothing was served.
    Printed,
    /// The supervised run finished.
    Served(RunSummary),
}

/// Runs the console and maps the outcome to an exit code.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    match try_run(args, stdout) {
        Ok(Outcome::Printed) => ExitCode::SUCCESS,
        Ok(Outcome::Served(summary)) => {
            if !summary.is_clean() {
                warn!(
                    target: CONSOLE_TARGET,
                    trigger = %summary.trigger(),
                    "services reported failures during the run"
                );
            }
            ExitCode::SUCCESS
        }
        Err(ConsoleError::Config(ConfigError::Arguments(error))) => {
            render_clap_error(&error, stdout, stderr)
        }
        Err(error) => {
            let _ = writeln!(stderr, "gantry-console: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration from `args` and either prints the requested
/// information or serves until shutdown.
pub fn try_run<I, W>(args: I, stdout: &mut W) -> Result<Outcome, ConsoleError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    let config = Config::load_from_iter(args)?;

    if config.show_config() {
        let rendered = serde_json::to_string_pretty(&config)?;
        writeln!(stdout, "{rendered}")?;
        return Ok(Outcome::Printed);
    }

    if config.show_banner() {
        writeln!(stdout, "{}", banner())?;
        stdout.flush()?;
    }

    telemetry::initialise(&config)?;
    let signal = SystemShutdownSignal::install(config.shutdown_signals())?;
    let supervisor = compose(&config);
    info!(
        target: CONSOLE_TARGET,
        address = %config.addr(),
        policy = %config.exit_policy(),
        "console starting"
    );
    let summary = LifecycleSession::new(signal).run(&supervisor);
    info!(
        target: CONSOLE_TARGET,
        trigger = %summary.trigger(),
        "console stopped"
    );
    Ok(Outcome::Served(summary))
}

/// Builds the supervised service tree for `config`.
#[must_use]
pub fn compose(config: &Config) -> Supervisor {
    let server = HttpServer::new(HttpServerConfig::from(config), version_handler).named("http");
    Supervisor::new()
        .named("gantry-console")
        .with_policy(config.exit_policy())
        .with_child(server)
}

fn version_handler(_request: &Request) -> Response {
    Response::text(200, format!("{}\n", banner()))
}

fn banner() -> String {
    format!("gantry-console {VERSION}")
}

fn render_clap_error<W, E>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    let rendered = error.render().to_string();
    if matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    ) {
        let _ = write!(stdout, "{rendered}");
        ExitCode::SUCCESS
    } else {
        let _ = write!(stderr, "{rendered}");
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use gantry::Runnable;
    use rstest::rstest;
    use serde_json::Value;

    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("gantry-console")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[rstest]
    fn show_config_prints_json_and_does_not_serve() {
        let mut stdout = Vec::new();

        let outcome = try_run(args(&["--show-config", "--addr", "127.0.0.1:9001"]), &mut stdout)
            .expect("show config");

        assert!(matches!(outcome, Outcome::Printed));
        let value: Value = serde_json::from_slice(&stdout).expect("json output");
        assert_eq!(value["addr"], "127.0.0.1:9001");
        assert_eq!(value["show_banner"], true);
    }

    #[rstest]
    #[case(&["--version"], true)]
    #[case(&["--help"], true)]
    #[case(&["--no-such-flag"], false)]
    #[case(&["--exit-policy", "sometimes"], false)]
    fn clap_displays_and_errors_map_to_exit_codes(#[case] flags: &[&str], #[case] success: bool) {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());

        let code = run(args(flags), &mut stdout, &mut stderr);

        let expected = if success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
        assert_eq!(format!("{code:?}"), format!("{expected:?}"));
        assert_eq!(stdout.is_empty(), !success);
        assert_eq!(stderr.is_empty(), success);
    }

    #[rstest]
    fn compose_wraps_the_server_in_a_named_supervisor() {
        let supervisor = compose(&Config::default());
        assert_eq!(supervisor.name(), "gantry-console");
        assert_eq!(supervisor.len(), 1);
    }

    #[rstest]
    fn version_handler_reports_the_banner() {
        let response = version_handler(&Request::new("GET", "/"));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), format!("{}\n", banner()).as_bytes());
    }
}
