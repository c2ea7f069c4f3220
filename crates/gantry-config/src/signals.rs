//! Names for the operating system signals that may request shutdown.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A termination signal the lifecycle may listen for.
///
/// Only the names live here; mapping to raw signal numbers is the job of the
/// runtime crate so this crate stays free of platform dependencies.
#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SignalKind {
    /// `SIGINT`, usually Ctrl-C on a terminal.
    #[strum(to_string = "interrupt", serialize = "int", serialize = "sigint")]
    Interrupt,
    /// `SIGTERM`, the default request from process managers.
    #[strum(to_string = "terminate", serialize = "term", serialize = "sigterm")]
    Terminate,
    /// `SIGQUIT`.
    #[strum(to_string = "quit", serialize = "sigquit")]
    Quit,
    /// `SIGHUP`.
    #[strum(to_string = "hangup", serialize = "hup", serialize = "sighup")]
    Hangup,
}

/// Errors encountered while parsing a [`SignalKind`] from text.
pub type SignalKindParseError = strum::ParseError;
