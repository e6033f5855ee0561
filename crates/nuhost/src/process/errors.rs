//! Defines the unified error surface for the launcher.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use nuhost_config::SettingsError;
use ortho_config::OrthoError;
use thiserror::Error;

use crate::isolation::IsolationError;
use crate::telemetry::TelemetryError;

/// Errors surfaced while launching or supervising the host.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Settings failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Loaded settings could not be interpreted.
    #[error("invalid settings: {source}")]
    Settings {
        /// Underlying settings error.
        #[source]
        source: SettingsError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Resolving the base directory failed.
    #[error("failed to resolve the base directory: {source}")]
    BaseDirectory {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The base directory is not valid UTF-8.
    #[error("base directory '{}' is not valid UTF-8", path.display())]
    NonUtf8BaseDirectory {
        /// Offending path.
        path: PathBuf,
    },
    /// Writing to the console failed.
    #[error("failed to write to the console: {source}")]
    Console {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal watcher could not be started.
    #[error("failed to watch for shutdown signals: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The isolated host could not be started.
    #[error("failed to start the host: {source}")]
    Isolation {
        /// Underlying isolation error.
        #[source]
        source: IsolationError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<SettingsError> for LaunchError {
    fn from(source: SettingsError) -> Self {
        Self::Settings { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<IsolationError> for LaunchError {
    fn from(source: IsolationError) -> Self {
        Self::Isolation { source }
    }
}
