//! Supervision policy shared by the composite supervisor and the binaries.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Decides what a composite does when one child stops on its own.
///
/// A child "stops on its own" when its `begin` returns without the composite
/// having been halted, whether it completed cleanly or failed.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExitPolicy {
    /// The exit is reported and the remaining children keep running.
    #[default]
    Isolate,
    /// The first exit halts every sibling.
    Cascade,
}

impl ExitPolicy {
    /// Returns `true` when one child's exit should stop the whole group.
    #[must_use]
    pub const fn cascades(self) -> bool {
        matches!(self, Self::Cascade)
    }
}
