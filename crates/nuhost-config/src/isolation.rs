use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Execution context used to run the host away from the launcher.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IsolationMode {
    /// A dedicated OS thread with its own runtime inside the launcher process.
    #[default]
    Thread,
    /// A child process speaking the agent protocol over stdio.
    Process,
}

/// Errors encountered while parsing an [`IsolationMode`] from text.
pub type IsolationModeParseError = strum::ParseError;
