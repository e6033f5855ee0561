//! Recording test doubles and scripted services for host test suites.
//!
//! Compiled for this crate's tests and for downstream crates that enable the
//! `test-support` feature.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;

use crate::health::HostReporter;
use crate::host::HostError;
use crate::hosting::{HostEvent, HostEventSink};
use crate::http::{HttpError, HttpTraceReporter};
use crate::model::{ServiceHostDescription, ServiceName};
use crate::service::{
    HttpSurface, Service, ServiceCore, ServiceDefinition, ServiceError, ServiceScope,
};
use crate::telemetry::EventSource;

fn push<T>(events: &Mutex<Vec<T>>, event: T) {
    events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

fn snapshot<T: Clone>(events: &Mutex<Vec<T>>) -> Vec<T> {
    events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Lifecycle events captured by [`RecordingHostReporter`]. Services are
/// identified by their short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Initialisation began.
    HostInitialising,
    /// Initialisation completed.
    HostInitialised,
    /// Initialisation failed with a message.
    HostInitialisationFailed(String),
    /// A service is being constructed.
    ServiceInitialising(String),
    /// A service's start began.
    ServiceStarting(String),
    /// A service's start completed with its result.
    ServiceStarted(String, bool),
    /// A service's start failed.
    ServiceStartFailed(String, String),
    /// A URL is being bound.
    HttpBinding(String),
    /// The listener started.
    HttpStarted,
    /// The listener failed to start.
    HttpFailed(String),
    /// HTTP was skipped for lack of URLs.
    HttpSkipped,
    /// A run loop began.
    ServiceRunning(String),
    /// A run loop returned.
    ServiceStopped(String),
    /// A run loop faulted.
    ServiceFaulted(String, String),
    /// Shutdown was requested.
    ShutdownRequested,
    /// The host stopped cleanly.
    CleanShutdown,
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHostReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingHostReporter {
    /// Copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        snapshot(&self.events)
    }

    /// Number of recorded events equal to `event`.
    #[must_use]
    pub fn count(&self, event: &LifecycleEvent) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }
}

impl HostReporter for RecordingHostReporter {
    fn host_initialising(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::HostInitialising);
    }

    fn host_initialised(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::HostInitialised);
    }

    fn host_initialisation_failed(&self, _host: &ServiceHostDescription, error: &HostError) {
        push(
            &self.events,
            LifecycleEvent::HostInitialisationFailed(error.to_string()),
        );
    }

    fn service_initialising(&self, service: &ServiceName) {
        push(
            &self.events,
            LifecycleEvent::ServiceInitialising(service.name().to_owned()),
        );
    }

    fn service_starting(&self, service: &ServiceName) {
        push(
            &self.events,
            LifecycleEvent::ServiceStarting(service.name().to_owned()),
        );
    }

    fn service_started(&self, service: &ServiceName, started: bool) {
        push(
            &self.events,
            LifecycleEvent::ServiceStarted(service.name().to_owned(), started),
        );
    }

    fn service_start_failed(&self, service: &ServiceName, error: &ServiceError) {
        push(
            &self.events,
            LifecycleEvent::ServiceStartFailed(service.name().to_owned(), error.to_string()),
        );
    }

    fn http_binding(&self, url: &str) {
        push(&self.events, LifecycleEvent::HttpBinding(url.to_owned()));
    }

    fn http_started(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::HttpStarted);
    }

    fn http_failed(&self, _host: &ServiceHostDescription, error: &HttpError) {
        push(&self.events, LifecycleEvent::HttpFailed(error.to_string()));
    }

    fn http_skipped(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::HttpSkipped);
    }

    fn service_running(&self, service: &ServiceName) {
        push(
            &self.events,
            LifecycleEvent::ServiceRunning(service.name().to_owned()),
        );
    }

    fn service_stopped(&self, service: &ServiceName) {
        push(
            &self.events,
            LifecycleEvent::ServiceStopped(service.name().to_owned()),
        );
    }

    fn service_faulted(&self, service: &ServiceName, error: &ServiceError) {
        push(
            &self.events,
            LifecycleEvent::ServiceFaulted(service.name().to_owned(), error.to_string()),
        );
    }

    fn shutdown_requested(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::ShutdownRequested);
    }

    fn clean_shutdown(&self, _host: &ServiceHostDescription) {
        push(&self.events, LifecycleEvent::CleanShutdown);
    }
}

/// A request boundary captured by [`RecordingHttpTraceReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A request arrived.
    Begin {
        /// HTTP method.
        method: String,
        /// Absolute URL.
        url: String,
        /// Correlation ID.
        request_id: String,
    },
    /// A response was produced.
    End {
        /// Status code.
        status: u16,
        /// Absolute URL.
        url: String,
        /// Body length.
        content_length: u64,
        /// Correlation ID.
        request_id: String,
    },
}

impl TraceEvent {
    /// Correlation ID carried by either kind of event.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Begin { request_id, .. } | Self::End { request_id, .. } => request_id,
        }
    }
}

/// Records request boundaries for assertions.
#[derive(Debug, Default)]
pub struct RecordingHttpTraceReporter {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingHttpTraceReporter {
    /// Copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        snapshot(&self.events)
    }
}

impl HttpTraceReporter for RecordingHttpTraceReporter {
    fn begin_request(
        &self,
        method: &str,
        url: &str,
        _referrer: &str,
        _user_agent: &str,
        request_id: &str,
    ) {
        push(
            &self.events,
            TraceEvent::Begin {
                method: method.to_owned(),
                url: url.to_owned(),
                request_id: request_id.to_owned(),
            },
        );
    }

    fn end_request(&self, status: u16, url: &str, content_length: u64, request_id: &str) {
        push(
            &self.events,
            TraceEvent::End {
                status,
                url: url.to_owned(),
                content_length,
                request_id: request_id.to_owned(),
            },
        );
    }
}

/// Collects relayed host events.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingEventSink {
    /// Copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        snapshot(&self.events)
    }
}

impl HostEventSink for RecordingEventSink {
    fn publish(&self, event: HostEvent) {
        push(&self.events, event);
    }
}

/// How a [`ScriptedService`] answers `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StartBehaviour {
    /// Start and report success.
    #[default]
    Succeed,
    /// Decline to start.
    Decline,
    /// Fail with the given message.
    Fail(String),
}

/// Behaviour of a [`ScriptedService`].
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Answer to `start`.
    pub start: StartBehaviour,
    /// When set, `run` faults with this message once shutdown is requested.
    pub run_fault: Option<String>,
    /// HTTP application to mount.
    pub http: Option<Router>,
    /// Base path overriding the default.
    pub base_path: Option<String>,
    /// Trace targets to route.
    pub event_sources: Vec<&'static str>,
}

impl Script {
    /// A service that starts successfully and mounts `router`.
    #[must_use]
    pub fn http(router: Router) -> Self {
        Self {
            http: Some(router),
            ..Self::default()
        }
    }

    /// A service whose start fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            start: StartBehaviour::Fail(message.to_owned()),
            ..Self::default()
        }
    }

    /// A service that declines to start.
    #[must_use]
    pub fn declining() -> Self {
        Self {
            start: StartBehaviour::Decline,
            ..Self::default()
        }
    }
}

/// A service driven entirely by its [`Script`].
#[derive(Debug)]
pub struct ScriptedService {
    core: ServiceCore,
    script: Script,
    starts: AtomicUsize,
    runs: AtomicUsize,
    disposed: AtomicBool,
    resolved_configuration: AtomicBool,
}

impl ScriptedService {
    /// Builds the service around `core`.
    #[must_use]
    pub const fn new(core: ServiceCore, script: Script) -> Self {
        Self {
            core,
            script,
            starts: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            resolved_configuration: AtomicBool::new(false),
        }
    }

    /// Declares a scripted service named `name`.
    #[must_use]
    pub fn definition(name: &str, script: Script) -> ServiceDefinition {
        ServiceDefinition::new(name, move |core| Self::new(core, script.clone()))
    }

    /// How many times `start` ran.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// How many times `run` ran.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether `dispose` ran.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether `start` found the configuration hub in its scope.
    #[must_use]
    pub fn resolved_configuration(&self) -> bool {
        self.resolved_configuration.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for ScriptedService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    async fn start(&self, scope: &ServiceScope) -> Result<bool, ServiceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let found = scope
            .resolve::<nuhost_config::ConfigurationHub>()
            .is_some();
        self.resolved_configuration.store(found, Ordering::SeqCst);
        match &self.script.start {
            StartBehaviour::Succeed => Ok(true),
            StartBehaviour::Decline => Ok(false),
            StartBehaviour::Fail(message) => Err(ServiceError::new(message.clone())),
        }
    }

    async fn run(&self) -> Result<(), ServiceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.core.host().when_shutdown().await;
        match &self.script.run_fault {
            Some(message) => Err(ServiceError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn event_sources(&self) -> Vec<EventSource> {
        self.script
            .event_sources
            .iter()
            .copied()
            .map(EventSource::new)
            .collect()
    }

    fn http(&self) -> Option<HttpSurface> {
        let router = self.script.http.clone()?;
        let surface = HttpSurface::new(self.name(), router);
        Some(match &self.script.base_path {
            Some(base_path) => surface.with_base_path(base_path),
            None => surface,
        })
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}
