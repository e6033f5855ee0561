//! The contract every hosted service implements.
//!
//! A service is constructed by its [`ServiceDefinition`] factory from a
//! [`ServiceCore`] carrying its [`ServiceName`] and a [`HostHandle`]. The host
//! then drives it through `start`, `run` and `dispose`; HTTP-capable services
//! additionally expose an [`HttpSurface`] that the multiplexer mounts under
//! the service's base path.

mod catalog;
mod scope;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;
use thiserror::Error;
use time::OffsetDateTime;

use crate::host::HostHandle;
use crate::model::{BuildInfo, ServiceName};
use crate::telemetry::EventSource;

pub use catalog::{ServiceCatalog, ServiceDefinition, ServiceFactory};
pub use scope::{ComponentMap, ScopeBuilder, ServiceScope};

/// Lifecycle contract implemented by hosted services.
///
/// Only [`Service::core`] and [`Service::start`] need bespoke implementations;
/// the remaining hooks default to the behaviour of a service that waits for
/// host shutdown and exposes nothing over HTTP.
#[async_trait]
pub trait Service: IntoAny + Send + Sync + 'static {
    /// Name, host handle and heartbeat shared by every service.
    fn core(&self) -> &ServiceCore;

    /// Registers components visible only inside this service's scope.
    fn register_components(&self, _components: &mut ScopeBuilder) {}

    /// Performs one-time initialisation.
    ///
    /// Returns `Ok(false)` when the service intentionally declined to start.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when initialisation failed. The host reports
    /// the failure and fails its aggregate start.
    async fn start(&self, scope: &ServiceScope) -> Result<bool, ServiceError>;

    /// Main loop. The default waits for host shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the loop faulted.
    async fn run(&self) -> Result<(), ServiceError> {
        self.core().host().when_shutdown().await;
        Ok(())
    }

    /// Trace targets routed to the shared log sink while the service runs.
    fn event_sources(&self) -> Vec<EventSource> {
        Vec::new()
    }

    /// HTTP application mounted by the multiplexer, if the service has one.
    fn http(&self) -> Option<HttpSurface> {
        None
    }

    /// Build metadata reported in the discovery document.
    fn build_info(&self) -> BuildInfo {
        BuildInfo::platform()
    }

    /// Releases resources once `run` has returned.
    fn dispose(&self) {}

    /// Fully qualified service name.
    fn name(&self) -> &ServiceName {
        self.core().name()
    }

    /// Records a liveness timestamp.
    fn heartbeat(&self) {
        self.core().heartbeat();
    }

    /// Most recent liveness timestamp.
    fn last_heartbeat(&self) -> Option<OffsetDateTime> {
        self.core().last_heartbeat()
    }
}

/// Upcasts shared services so typed lookups can downcast them.
pub trait IntoAny {
    /// Converts `self` into a type-erased shared pointer.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> IntoAny for T
where
    T: Any + Send + Sync,
{
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Lifecycle position of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    /// Built but not yet started.
    Constructed,
    /// `start` is in progress.
    Starting,
    /// `start` succeeded.
    Started,
    /// `start` returned `false`.
    Declined,
    /// `start` failed.
    StartFailed,
    /// `run` is in progress.
    Running,
    /// Host shutdown reached the service.
    Stopping,
    /// `run` has returned.
    Stopped,
}

/// State every service carries: its name, its host and its heartbeat.
pub struct ServiceCore {
    name: ServiceName,
    host: HostHandle,
    heartbeat: Mutex<Option<OffsetDateTime>>,
    status: Mutex<ServiceStatus>,
}

impl ServiceCore {
    /// Builds the core handed to a service factory.
    #[must_use]
    pub fn new(name: ServiceName, host: HostHandle) -> Self {
        Self {
            name,
            host,
            heartbeat: Mutex::new(None),
            status: Mutex::new(ServiceStatus::Constructed),
        }
    }

    /// Fully qualified service name.
    #[must_use]
    pub const fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Handle to the owning host.
    #[must_use]
    pub const fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Records a liveness timestamp using the host clock.
    pub fn heartbeat(&self) {
        let now = self.host.clock().now();
        *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    /// Most recent liveness timestamp.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<OffsetDateTime> {
        *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle position.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: ServiceStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl fmt::Debug for ServiceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCore")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// An HTTP application and the path it is mounted under.
#[derive(Debug, Clone)]
pub struct HttpSurface {
    base_path: String,
    router: Router,
}

impl HttpSurface {
    /// Mounts `router` under the service's default base path, `/<lower-cased name>`.
    #[must_use]
    pub fn new(name: &ServiceName, router: Router) -> Self {
        Self {
            base_path: default_base_path(name.name()),
            router,
        }
    }

    /// Overrides the base path. A missing leading slash is added.
    #[must_use]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let trimmed = base_path.trim_end_matches('/');
        self.base_path = if trimmed.starts_with('/') {
            trimmed.to_owned()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Path prefix the router is mounted under, without a trailing slash.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The mounted application.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }
}

/// Default mount point for a service: `/` followed by its lower-cased name.
#[must_use]
pub fn default_base_path(name: &str) -> String {
    format!("/{}", name.to_lowercase())
}

/// Failure reported by a service from `start` or `run`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable message describing the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
