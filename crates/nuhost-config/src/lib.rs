//! Configuration for the NuHost launcher and the services it hosts.
//!
//! Two distinct layers live here. [`HostSettings`] describes how the launcher
//! itself behaves (which services to activate, where to bind, how to log) and
//! is resolved through `ortho_config`, so values merge from defaults, an
//! optional configuration file, `NUHOST_*` environment variables and CLI
//! flags. Hosted services never see those settings directly; they read dotted
//! keys such as `Http.AdminKey` through a [`SettingSource`], wrapped by the
//! typed [`ConfigurationHub`].

mod defaults;
mod hub;
mod isolation;
pub mod keys;
mod logging;
mod source;
mod urls;

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_HOST_NAME, DEFAULT_HTTP_PORT, DEFAULT_LOG_FILTER, default_log_filter,
    default_log_format,
};
pub use hub::{ConfigurationHub, HttpSettings};
pub use isolation::{IsolationMode, IsolationModeParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use source::{EnvironmentSettings, FnSettings, SettingSource, StaticSettings};
pub use urls::bind_urls;

/// Launcher settings merged from defaults, files, environment and CLI flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NUHOST")]
pub struct HostSettings {
    /// Names of the services to activate. Empty activates every known service.
    #[serde(default)]
    pub services: Vec<String>,
    /// Explicit bind URLs. When present they replace the derived port URLs.
    #[serde(default)]
    pub urls: Vec<String>,
    /// HTTP port used to derive bind URLs.
    pub http_port: Option<u16>,
    /// Root path appended to derived bind URLs.
    pub http_path: Option<String>,
    /// Restricts derived bind URLs to the loopback host.
    pub local_only: Option<bool>,
    /// Directory the hosted application runs from.
    pub base_directory: Option<Utf8PathBuf>,
    /// JSON object of string pairs supplying service configuration.
    pub configuration: Option<String>,
    /// Log filter expression understood by `tracing_subscriber::EnvFilter`.
    pub log_filter: Option<String>,
    /// Output format for launcher diagnostics.
    pub log_format: Option<LogFormat>,
    /// Execution context the host runs in.
    pub isolation: Option<IsolationMode>,
    /// Logical host name used to build the instance name.
    pub host_name: Option<String>,
}

/// Errors raised while interpreting loaded settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The inline configuration was not a JSON object of string pairs.
    #[error("configuration must be a JSON object of string values: {source}")]
    InvalidConfiguration {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl HostSettings {
    /// Effective log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Effective log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Effective isolation mode.
    #[must_use]
    pub fn isolation(&self) -> IsolationMode {
        self.isolation.unwrap_or_default()
    }

    /// Effective logical host name.
    #[must_use]
    pub fn host_name(&self) -> &str {
        self.host_name.as_deref().unwrap_or(DEFAULT_HOST_NAME)
    }

    /// Bind URLs: the explicit list if any, otherwise URLs derived from the port.
    #[must_use]
    pub fn bind_urls(&self) -> Vec<String> {
        if !self.urls.is_empty() {
            return self.urls.clone();
        }
        bind_urls(
            Some(self.http_port.unwrap_or(DEFAULT_HTTP_PORT)),
            self.http_path.as_deref().unwrap_or_default(),
            self.local_only.unwrap_or(true),
        )
    }

    /// Parses the inline JSON configuration, if one was supplied.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidConfiguration`] when the value is not a
    /// JSON object whose values are all strings.
    pub fn configuration_map(&self) -> Result<Option<BTreeMap<String, String>>, SettingsError> {
        let Some(raw) = self.configuration.as_deref() else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|source| SettingsError::InvalidConfiguration { source })
    }
}
