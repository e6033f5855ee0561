//! The bootstrap interface between a launcher and the host.
//!
//! A launcher hands [`StartOptions`] to an [`ApplicationHost`] inside some
//! isolated context and receives [`HostEvent`]s back through a
//! [`HostEventSink`]. Everything here is serialisable so the same contract
//! works across a process boundary; keep changes additive and bump
//! [`PROTOCOL_VERSION`] when the shape changes.

mod local;

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use nuhost_config::{EnvironmentSettings, SettingSource, StaticSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::host::HostError;
use crate::model::ServiceHostDescription;
use crate::telemetry::{EventRouting, LogEventEntry, NoopRouting};

pub use local::LocalApplicationHost;

/// Version of the bootstrap contract this build speaks.
pub const PROTOCOL_VERSION: u32 = 1;

const fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

/// Notifications relayed from the host to its launcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// The aggregate start finished.
    Started {
        /// Whether every service started.
        success: bool,
    },
    /// A trace event passed the relay filter.
    Log {
        /// The relayed event.
        entry: LogEventEntry,
    },
    /// The host has stopped.
    Shutdown {
        /// Deepest error message when the host stopped because of a failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Receives host events on the launcher side.
pub trait HostEventSink: Send + Sync {
    /// Delivers one event. Must not block.
    fn publish(&self, event: HostEvent);
}

impl<T> HostEventSink for Arc<T>
where
    T: HostEventSink + ?Sized,
{
    fn publish(&self, event: HostEvent) {
        (**self).publish(event);
    }
}

impl HostEventSink for UnboundedSender<HostEvent> {
    fn publish(&self, event: HostEvent) {
        // A closed channel means the launcher stopped listening.
        let _ = self.send(event);
    }
}

/// Everything a launcher passes to the host.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Contract version the launcher speaks.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// Services to activate. Empty activates every catalogued service.
    #[serde(default)]
    pub services: Vec<String>,
    /// URLs the shared listener binds.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Static service configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<BTreeMap<String, String>>,
    /// Callback configuration; cannot cross a process boundary.
    #[serde(skip)]
    pub configuration_provider: Option<Arc<dyn SettingSource>>,
    /// Directory the launcher treats as the application base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_base: Option<Utf8PathBuf>,
    /// Description of the host to create.
    pub description: ServiceHostDescription,
}

impl StartOptions {
    /// Options for `description` with every other field defaulted.
    #[must_use]
    pub fn new(description: ServiceHostDescription) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            services: Vec::new(),
            urls: Vec::new(),
            configuration: None,
            configuration_provider: None,
            application_base: None,
            description,
        }
    }

    /// Resolves service settings: the callback provider if set, else the
    /// static map, else `NUHOST_*` environment variables.
    #[must_use]
    pub fn settings_source(&self) -> Arc<dyn SettingSource> {
        if let Some(provider) = &self.configuration_provider {
            return Arc::clone(provider);
        }
        match &self.configuration {
            Some(values) => Arc::new(StaticSettings::new(values.clone())),
            None => Arc::new(EnvironmentSettings::default()),
        }
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("protocol_version", &self.protocol_version)
            .field("services", &self.services)
            .field("urls", &self.urls)
            .field(
                "configuration",
                &self.configuration.as_ref().map(BTreeMap::len),
            )
            .field("configuration_provider", &self.configuration_provider.is_some())
            .field("application_base", &self.application_base)
            .field("description", &self.description)
            .finish()
    }
}

/// The launcher's side of a running host: where events go, how to ask for
/// shutdown, and where event sources get enabled.
#[derive(Clone)]
pub struct HostControl {
    /// Receives relayed events.
    pub events: Arc<dyn HostEventSink>,
    /// Cancelled by the launcher to request shutdown.
    pub shutdown: CancellationToken,
    /// Enables service event sources in the relay filter.
    pub routing: Arc<dyn EventRouting>,
}

impl HostControl {
    /// Control relaying to `events`, with a fresh shutdown token and no routing.
    #[must_use]
    pub fn new(events: Arc<dyn HostEventSink>) -> Self {
        Self {
            events,
            shutdown: CancellationToken::new(),
            routing: Arc::new(NoopRouting),
        }
    }

    /// Replaces the shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Replaces the event routing.
    #[must_use]
    pub fn with_routing(mut self, routing: Arc<dyn EventRouting>) -> Self {
        self.routing = routing;
        self
    }
}

impl fmt::Debug for HostControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostControl")
            .field("shutdown_requested", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Errors raised while bootstrapping a host.
#[derive(Debug, Error)]
pub enum HostingError {
    /// The launcher speaks a newer contract.
    #[error("bootstrap protocol {requested} is newer than supported version {supported}")]
    UnsupportedProtocol {
        /// Version requested.
        requested: u32,
        /// Newest version understood.
        supported: u32,
    },
    /// The async runtime could not be created.
    #[error("failed to create host runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The host failed.
    #[error(transparent)]
    Host {
        /// Host failure.
        #[from]
        source: HostError,
    },
}

/// The stable entry point a launcher invokes inside an isolated context.
#[async_trait]
pub trait ApplicationHost: Send + Sync {
    /// Runs the host to completion on a runtime of its own.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError`] when the runtime cannot be built or the host
    /// fails.
    fn run(&self, options: StartOptions, control: HostControl) -> Result<(), HostingError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| HostingError::Runtime { source })?;
        runtime.block_on(self.run_async(options, control))
    }

    /// Runs the host to completion on the caller's runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError`] when the options are unsupported or the host
    /// fails to initialise, start or run.
    async fn run_async(&self, options: StartOptions, control: HostControl)
    -> Result<(), HostingError>;
}

/// Message of the innermost error in `error`'s source chain.
#[must_use]
pub fn deepest_message(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
