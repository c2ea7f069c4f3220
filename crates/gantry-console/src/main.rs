//! Console entry point.
//!
//! Delegates to [`gantry_console::run`], which loads configuration, serves
//! HTTP under the supervisor and returns once a shutdown signal has been
//! handled.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    gantry_console::run(std::env::args_os(), &mut stdout, &mut stderr)
}
