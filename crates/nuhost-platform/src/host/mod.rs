//! The host orchestrator.
//!
//! A [`ServiceHost`] moves through `Created → Initialized → Starting →
//! Running → ShuttingDown → Stopped`. Services start concurrently; a failing
//! start fails the aggregate call without rolling back siblings that already
//! started. Shutdown is a single shared cancellation token.

mod composition;
mod handle;
mod registry;

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use futures::future::join_all;
use nuhost_config::{ConfigurationHub, SettingSource};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::filter::LevelFilter;

use crate::certificates::{CertificateStore, PemDirectoryStore};
use crate::clock::{Clock, SystemClock};
use crate::health::{HostReporter, StructuredHostReporter};
use crate::http::{
    HostView, HttpError, HttpServer, HttpTraceReporter, StructuredHttpTraceReporter, build_router,
};
use crate::model::{ServiceHostDescription, ServiceName};
use crate::service::{
    IntoAny, ScopeBuilder, Service, ServiceCore, ServiceDefinition, ServiceError, ServiceScope,
    ServiceStatus,
};
use crate::telemetry::{EventRouting, NoopRouting};

pub use composition::Composition;
pub use handle::HostHandle;

use registry::InstanceRegistry;

pub(crate) const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Position of a host in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Built, not yet initialised.
    Created,
    /// Composition is ready.
    Initialized,
    /// Services are starting.
    Starting,
    /// Every service start has been attempted.
    Running,
    /// Shutdown was requested; run loops are draining.
    ShuttingDown,
    /// Every run loop has returned and instances are disposed.
    Stopped,
}

/// Errors raised by the host orchestrator.
#[derive(Debug, Error)]
pub enum HostError {
    /// An operation was attempted in the wrong lifecycle state.
    #[error("cannot {operation} while the host is {state:?}")]
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// State the host was in.
        state: HostState,
    },
    /// Two definitions share a name.
    #[error("service '{name}' is defined more than once")]
    DuplicateService {
        /// Duplicated name.
        name: String,
    },
    /// A service could not be constructed or failed its start.
    #[error("service '{service}' failed to start: {source}")]
    StartFailed {
        /// Failing service.
        service: ServiceName,
        /// Failure reported by the service.
        #[source]
        source: ServiceError,
    },
    /// The shared listener could not be started.
    #[error("failed to start http: {source}")]
    Http {
        /// Underlying HTTP error.
        #[from]
        source: HttpError,
    },
    /// A service's run loop faulted.
    #[error("service '{service}' faulted: {source}")]
    ServiceFaulted {
        /// Faulting service.
        service: ServiceName,
        /// Failure reported by the service.
        #[source]
        source: ServiceError,
    },
}

/// Configures a [`ServiceHost`].
pub struct ServiceHostBuilder {
    description: ServiceHostDescription,
    source: Arc<dyn SettingSource>,
    definitions: Vec<ServiceDefinition>,
    urls: Vec<String>,
    reporter: Arc<dyn HostReporter>,
    http_trace: Arc<dyn HttpTraceReporter>,
    routing: Arc<dyn EventRouting>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn CertificateStore>>,
}

impl ServiceHostBuilder {
    /// Services to host.
    #[must_use]
    pub fn services(mut self, definitions: Vec<ServiceDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    /// URLs the shared listener binds. With none, HTTP is skipped.
    #[must_use]
    pub fn urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    /// Lifecycle observer.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HostReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Request observer.
    #[must_use]
    pub fn http_trace(mut self, http_trace: Arc<dyn HttpTraceReporter>) -> Self {
        self.http_trace = http_trace;
        self
    }

    /// Where service event sources are enabled.
    #[must_use]
    pub fn routing(mut self, routing: Arc<dyn EventRouting>) -> Self {
        self.routing = routing;
        self
    }

    /// The single clock shared by the composition.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the certificate store chosen from configuration.
    #[must_use]
    pub fn certificate_store(mut self, store: Arc<dyn CertificateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the host in the `Created` state.
    #[must_use]
    pub fn build(self) -> ServiceHost {
        let config = ConfigurationHub::new(self.source);
        let shutdown = CancellationToken::new();
        let handle = HostHandle::new(
            self.description.clone(),
            shutdown.clone(),
            config.clone(),
            self.clock,
        );
        ServiceHost {
            description: self.description,
            definitions: self.definitions,
            urls: self.urls,
            config,
            reporter: self.reporter,
            http_trace: self.http_trace,
            routing: self.routing,
            store: self.store,
            shutdown,
            handle,
            state: Mutex::new(HostState::Created),
            composition: OnceCell::new(),
            registry: OnceCell::new(),
            router: OnceCell::new(),
            created: Mutex::new(Vec::new()),
            server: Mutex::new(None),
            shutdown_requested: AtomicBool::new(false),
            run_claimed: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for ServiceHostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHostBuilder")
            .field("description", &self.description)
            .field("definitions", &self.definitions)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

/// One service that got far enough to be constructed.
struct Constructed {
    instance: Arc<dyn Service>,
    scope: ServiceScope,
}

struct Attempt {
    created: Option<Constructed>,
    type_id: TypeId,
    outcome: Result<bool, HostError>,
}

/// Supervises a fixed set of services within one process.
pub struct ServiceHost {
    description: ServiceHostDescription,
    definitions: Vec<ServiceDefinition>,
    urls: Vec<String>,
    config: ConfigurationHub,
    reporter: Arc<dyn HostReporter>,
    http_trace: Arc<dyn HttpTraceReporter>,
    routing: Arc<dyn EventRouting>,
    store: Option<Arc<dyn CertificateStore>>,
    shutdown: CancellationToken,
    handle: HostHandle,
    state: Mutex<HostState>,
    composition: OnceCell<Arc<Composition>>,
    registry: OnceCell<InstanceRegistry>,
    router: OnceCell<Router>,
    created: Mutex<Vec<Constructed>>,
    server: Mutex<Option<HttpServer>>,
    shutdown_requested: AtomicBool,
    run_claimed: AtomicBool,
}

impl ServiceHost {
    /// Starts configuring a host for `description`, resolving service
    /// settings through `source`.
    #[must_use]
    pub fn builder(
        description: ServiceHostDescription,
        source: Arc<dyn SettingSource>,
    ) -> ServiceHostBuilder {
        ServiceHostBuilder {
            description,
            source,
            definitions: Vec::new(),
            urls: Vec::new(),
            reporter: Arc::new(StructuredHostReporter::new()),
            http_trace: Arc::new(StructuredHttpTraceReporter),
            routing: Arc::new(NoopRouting),
            clock: Arc::new(SystemClock),
            store: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HostState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle shared with services.
    #[must_use]
    pub const fn handle(&self) -> &HostHandle {
        &self.handle
    }

    /// Host description.
    #[must_use]
    pub const fn description(&self) -> &ServiceHostDescription {
        &self.description
    }

    /// Host composition, once initialised.
    #[must_use]
    pub fn composition(&self) -> Option<&Arc<Composition>> {
        self.composition.get()
    }

    /// Builds the composition.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidState`] unless the host is `Created` and
    /// [`HostError::DuplicateService`] when two definitions share a name
    /// (ignoring case). A failed initialisation leaves the host `Created`.
    pub fn initialise(&self) -> Result<(), HostError> {
        self.expect_state("initialise", &[HostState::Created])?;
        self.reporter.host_initialising(&self.description);
        if let Err(error) = self.check_definitions() {
            self.reporter
                .host_initialisation_failed(&self.description, &error);
            return Err(error);
        }

        let store = self.store.clone().unwrap_or_else(|| {
            let store = self
                .config
                .certificate_store()
                .map_or_else(PemDirectoryStore::system, |root| {
                    PemDirectoryStore::under(&root)
                });
            Arc::new(store)
        });
        let composition = Composition::new(self.handle.clone(), store);
        let _ = self.composition.set(Arc::new(composition));
        self.set_state(HostState::Initialized);
        self.reporter.host_initialised(&self.description);
        Ok(())
    }

    fn check_definitions(&self) -> Result<(), HostError> {
        let mut seen = HashSet::new();
        for definition in &self.definitions {
            if !seen.insert(definition.name().to_lowercase()) {
                return Err(HostError::DuplicateService {
                    name: definition.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Starts every service concurrently, then the shared listener.
    ///
    /// Returns `true` only when every service started. The instance registry
    /// is built and the host enters `Running` once every start has been
    /// attempted, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first service failure (siblings stay started and HTTP is
    /// not started), [`HostError::Http`] when the listener cannot bind, or
    /// [`HostError::InvalidState`] unless the host is `Initialized`.
    pub async fn start(&self) -> Result<bool, HostError> {
        self.expect_state("start", &[HostState::Initialized])?;
        let Some(composition) = self.composition.get().cloned() else {
            return Err(HostError::InvalidState {
                operation: "start",
                state: self.state(),
            });
        };
        self.set_state(HostState::Starting);

        let attempts = join_all(
            self.definitions
                .iter()
                .map(|definition| self.start_service(definition, Arc::clone(&composition))),
        )
        .await;

        let mut started = Vec::new();
        let mut created = Vec::new();
        let mut failure = None;
        let mut all_started = true;
        for attempt in attempts {
            match attempt.outcome {
                Ok(true) => {
                    if let Some(instance) = &attempt.created {
                        started.push((attempt.type_id, Arc::clone(&instance.instance)));
                    }
                }
                Ok(false) => all_started = false,
                Err(error) => {
                    all_started = false;
                    failure.get_or_insert(error);
                }
            }
            created.extend(attempt.created);
        }
        *self.created.lock().unwrap_or_else(PoisonError::into_inner) = created;
        let _ = self.registry.set(InstanceRegistry::new(started));
        self.set_state(HostState::Running);
        if self.shutdown_requested.load(Ordering::SeqCst) {
            self.enter_shutting_down();
        }

        if let Some(error) = failure {
            return Err(error);
        }
        self.start_http().await?;
        Ok(all_started)
    }

    async fn start_service(
        &self,
        definition: &ServiceDefinition,
        composition: Arc<Composition>,
    ) -> Attempt {
        let name = ServiceName::new(
            self.description.instance_name().clone(),
            definition.name(),
        );
        let type_id = definition.type_id();
        self.reporter.service_initialising(&name);

        let instance = match definition.create(ServiceCore::new(name.clone(), self.handle.clone()))
        {
            Ok(instance) => instance,
            Err(error) => {
                self.reporter.service_start_failed(&name, &error);
                return Attempt {
                    created: None,
                    type_id,
                    outcome: Err(HostError::StartFailed {
                        service: name,
                        source: error,
                    }),
                };
            }
        };

        let mut components = ScopeBuilder::default();
        instance.register_components(&mut components);
        components.register_erased(type_id, Arc::clone(&instance).into_any());
        let scope = components.build(name.clone(), composition);

        self.reporter.service_starting(&name);
        self.route_event_sources(instance.as_ref());
        instance.core().set_status(ServiceStatus::Starting);

        let span = tracing::info_span!("service", service = %name);
        let outcome = match instance.start(&scope).instrument(span).await {
            Ok(started) => {
                instance.core().set_status(if started {
                    ServiceStatus::Started
                } else {
                    ServiceStatus::Declined
                });
                instance.heartbeat();
                self.reporter.service_started(&name, started);
                Ok(started)
            }
            Err(error) => {
                instance.core().set_status(ServiceStatus::StartFailed);
                self.reporter.service_start_failed(&name, &error);
                Err(HostError::StartFailed {
                    service: name,
                    source: error,
                })
            }
        };
        Attempt {
            created: Some(Constructed { instance, scope }),
            type_id,
            outcome,
        }
    }

    /// Enables each event source at `info`, then elevates it to
    /// `Host.TraceLevel` (default `trace`).
    fn route_event_sources(&self, service: &dyn Service) {
        let elevated = self
            .config
            .trace_level()
            .and_then(|level| level.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::TRACE);
        for source in service.event_sources() {
            for level in [LevelFilter::INFO, elevated] {
                if let Err(error) = self.routing.enable(&source, level) {
                    tracing::warn!(
                        target: HOST_TARGET,
                        event = "event_source_unrouted",
                        service = %service.name(),
                        source = %source,
                        error = %error,
                        "failed to route event source"
                    );
                }
            }
        }
    }

    async fn start_http(&self) -> Result<(), HostError> {
        let instances = self
            .registry
            .get()
            .map(|registry| registry.instances().to_vec())
            .unwrap_or_default();
        let has_http = instances.iter().any(|instance| instance.http().is_some());
        let view = HostView::new(self.description.clone(), instances);
        let router = build_router(view, &self.config.http(), Arc::clone(&self.http_trace));
        let router = self.router.get_or_init(|| router).clone();

        if self.urls.is_empty() {
            if has_http {
                self.reporter.http_skipped(&self.description);
            }
            return Ok(());
        }
        match HttpServer::bind(&self.urls, router, &self.shutdown, self.reporter.as_ref()).await {
            Ok(server) => {
                *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(server);
                self.reporter.http_started(&self.description);
                Ok(())
            }
            Err(error) => {
                self.reporter.http_failed(&self.description, &error);
                Err(error.into())
            }
        }
    }

    /// Awaits every started service's run loop, then stops the listener and
    /// disposes every constructed instance.
    ///
    /// There is no timeout: a run loop that ignores shutdown blocks this call.
    ///
    /// # Errors
    ///
    /// Returns the first run loop fault, or [`HostError::InvalidState`] when
    /// the host has not started or `run` was already called.
    pub async fn run(&self) -> Result<(), HostError> {
        self.expect_state("run", &[HostState::Running, HostState::ShuttingDown])?;
        if self.run_claimed.swap(true, Ordering::SeqCst) {
            return Err(HostError::InvalidState {
                operation: "run",
                state: self.state(),
            });
        }

        let instances = self
            .registry
            .get()
            .map(|registry| registry.instances().to_vec())
            .unwrap_or_default();
        let results = join_all(instances.iter().map(|instance| self.run_service(instance))).await;

        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(server) = server {
            server.stop().await;
        }

        let created = std::mem::take(
            &mut *self.created.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for Constructed { instance, scope } in created {
            instance.dispose();
            drop(scope);
        }
        self.set_state(HostState::Stopped);

        match results.into_iter().find_map(Result::err) {
            Some(error) => Err(error),
            None => {
                self.reporter.clean_shutdown(&self.description);
                Ok(())
            }
        }
    }

    async fn run_service(&self, instance: &Arc<dyn Service>) -> Result<(), HostError> {
        let name = instance.name().clone();
        if instance.core().status() != ServiceStatus::Stopping {
            instance.core().set_status(ServiceStatus::Running);
        }
        self.reporter.service_running(&name);
        let span = tracing::info_span!("service", service = %name);
        let result = instance.run().instrument(span).await;
        instance.core().set_status(ServiceStatus::Stopped);
        match result {
            Ok(()) => {
                self.reporter.service_stopped(&name);
                Ok(())
            }
            Err(error) => {
                self.reporter.service_faulted(&name, &error);
                Err(HostError::ServiceFaulted {
                    service: name,
                    source: error,
                })
            }
        }
    }

    /// Requests shutdown. Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reporter.shutdown_requested(&self.description);
        self.enter_shutting_down();
        self.shutdown.cancel();
    }

    /// Moves a running host to `ShuttingDown` and marks its live instances
    /// as stopping. A shutdown requested mid-start is applied by `start`.
    fn enter_shutting_down(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == HostState::Running {
                *state = HostState::ShuttingDown;
            }
        }
        if let Some(registry) = self.registry.get() {
            for instance in registry.instances() {
                if instance.core().status() == ServiceStatus::Running
                    || instance.core().status() == ServiceStatus::Started
                {
                    instance.core().set_status(ServiceStatus::Stopping);
                }
            }
        }
    }

    /// Started instance named `name`, ignoring case.
    #[must_use]
    pub fn get_instance(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.get()?.by_name(name)
    }

    /// Started instance of implementation type `T`.
    #[must_use]
    pub fn get_instance_of<T>(&self) -> Option<Arc<T>>
    where
        T: Service,
    {
        self.registry
            .get()?
            .by_type(TypeId::of::<T>())?
            .into_any()
            .downcast::<T>()
            .ok()
    }

    /// Started instances in definition order.
    #[must_use]
    pub fn instances(&self) -> Vec<Arc<dyn Service>> {
        self.registry
            .get()
            .map(|registry| registry.instances().to_vec())
            .unwrap_or_default()
    }

    /// The multiplexer router, once HTTP has been set up.
    #[must_use]
    pub fn http_router(&self) -> Option<Router> {
        self.router.get().cloned()
    }

    /// Addresses the listener is bound to.
    #[must_use]
    pub fn http_addresses(&self) -> Vec<SocketAddr> {
        self.server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|server| server.addresses().to_vec())
            .unwrap_or_default()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[HostState]) -> Result<(), HostError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(HostError::InvalidState { operation, state })
        }
    }

    fn set_state(&self, state: HostState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHost")
            .field("description", &self.description)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
