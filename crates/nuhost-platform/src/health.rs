//! Structured reporting of host and service lifecycle events.

use std::sync::Arc;

use crate::host::HostError;
use crate::http::HttpError;
use crate::model::{ServiceHostDescription, ServiceName};
use crate::service::ServiceError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HostReporter: Send + Sync {
    /// Invoked before the composition is built.
    fn host_initialising(&self, host: &ServiceHostDescription);

    /// Invoked once the composition is ready.
    fn host_initialised(&self, host: &ServiceHostDescription);

    /// Invoked when building the composition failed.
    fn host_initialisation_failed(&self, host: &ServiceHostDescription, error: &HostError);

    /// Invoked before a service instance is constructed.
    fn service_initialising(&self, service: &ServiceName);

    /// Invoked before a service's `start` runs.
    fn service_starting(&self, service: &ServiceName);

    /// Invoked after `start` returned; `started` is its result.
    fn service_started(&self, service: &ServiceName, started: bool);

    /// Invoked when constructing or starting a service failed.
    fn service_start_failed(&self, service: &ServiceName, error: &ServiceError);

    /// Invoked for each URL before the listener binds it.
    fn http_binding(&self, url: &str);

    /// Invoked once every listener is bound.
    fn http_started(&self, host: &ServiceHostDescription);

    /// Invoked when binding the listeners failed.
    fn http_failed(&self, host: &ServiceHostDescription, error: &HttpError);

    /// Invoked when HTTP services exist but no URLs were supplied.
    fn http_skipped(&self, host: &ServiceHostDescription);

    /// Invoked when a service's run loop begins.
    fn service_running(&self, service: &ServiceName);

    /// Invoked when a service's run loop returned normally.
    fn service_stopped(&self, service: &ServiceName);

    /// Invoked when a service's run loop failed.
    fn service_faulted(&self, service: &ServiceName, error: &ServiceError);

    /// Invoked the first time shutdown is requested.
    fn shutdown_requested(&self, host: &ServiceHostDescription);

    /// Invoked once every run loop has returned without error.
    fn clean_shutdown(&self, host: &ServiceHostDescription);
}

impl<T> HostReporter for Arc<T>
where
    T: HostReporter + ?Sized,
{
    fn host_initialising(&self, host: &ServiceHostDescription) {
        (**self).host_initialising(host);
    }

    fn host_initialised(&self, host: &ServiceHostDescription) {
        (**self).host_initialised(host);
    }

    fn host_initialisation_failed(&self, host: &ServiceHostDescription, error: &HostError) {
        (**self).host_initialisation_failed(host, error);
    }

    fn service_initialising(&self, service: &ServiceName) {
        (**self).service_initialising(service);
    }

    fn service_starting(&self, service: &ServiceName) {
        (**self).service_starting(service);
    }

    fn service_started(&self, service: &ServiceName, started: bool) {
        (**self).service_started(service, started);
    }

    fn service_start_failed(&self, service: &ServiceName, error: &ServiceError) {
        (**self).service_start_failed(service, error);
    }

    fn http_binding(&self, url: &str) {
        (**self).http_binding(url);
    }

    fn http_started(&self, host: &ServiceHostDescription) {
        (**self).http_started(host);
    }

    fn http_failed(&self, host: &ServiceHostDescription, error: &HttpError) {
        (**self).http_failed(host, error);
    }

    fn http_skipped(&self, host: &ServiceHostDescription) {
        (**self).http_skipped(host);
    }

    fn service_running(&self, service: &ServiceName) {
        (**self).service_running(service);
    }

    fn service_stopped(&self, service: &ServiceName) {
        (**self).service_stopped(service);
    }

    fn service_faulted(&self, service: &ServiceName, error: &ServiceError) {
        (**self).service_faulted(service, error);
    }

    fn shutdown_requested(&self, host: &ServiceHostDescription) {
        (**self).shutdown_requested(host);
    }

    fn clean_shutdown(&self, host: &ServiceHostDescription) {
        (**self).clean_shutdown(host);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHostReporter;

impl StructuredHostReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HostReporter for StructuredHostReporter {
    fn host_initialising(&self, host: &ServiceHostDescription) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "host_initialising",
            host = %host.instance_name(),
            machine = %host.machine_name(),
            "initialising host"
        );
    }

    fn host_initialised(&self, host: &ServiceHostDescription) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "host_initialised",
            host = %host.instance_name(),
            "host initialised"
        );
    }

    fn host_initialisation_failed(&self, host: &ServiceHostDescription, error: &HostError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "host_initialisation_failed",
            host = %host.instance_name(),
            error = %error,
            "host initialisation failed"
        );
    }

    fn service_initialising(&self, service: &ServiceName) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_initialising",
            service = %service,
            "initialising service"
        );
    }

    fn service_starting(&self, service: &ServiceName) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_starting",
            service = %service,
            "starting service"
        );
    }

    fn service_started(&self, service: &ServiceName, started: bool) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_started",
            service = %service,
            started,
            "service start completed"
        );
    }

    fn service_start_failed(&self, service: &ServiceName, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_start_failed",
            service = %service,
            host = %service.instance(),
            error = ?error,
            "service failed to start: {error}"
        );
    }

    fn http_binding(&self, url: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "http_binding",
            url,
            "binding http listener"
        );
    }

    fn http_started(&self, host: &ServiceHostDescription) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "http_started",
            host = %host.instance_name(),
            "http services started"
        );
    }

    fn http_failed(&self, host: &ServiceHostDescription, error: &HttpError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "http_failed",
            host = %host.instance_name(),
            error = %error,
            "http services failed to start"
        );
    }

    fn http_skipped(&self, host: &ServiceHostDescription) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "http_skipped",
            host = %host.instance_name(),
            "no http endpoints were specified, http services are not listening"
        );
    }

    fn service_running(&self, service: &ServiceName) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_running",
            service = %service,
            "service running"
        );
    }

    fn service_stopped(&self, service: &ServiceName) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_stopped",
            service = %service,
            "service stopped"
        );
    }

    fn service_faulted(&self, service: &ServiceName, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_faulted",
            service = %service,
            error = ?error,
            "service run loop failed: {error}"
        );
    }

    fn shutdown_requested(&self, host: &ServiceHostDescription) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            host = %host.instance_name(),
            "host shutdown requested"
        );
    }

    fn clean_shutdown(&self, host: &ServiceHostDescription) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "clean_shutdown",
            host = %host.instance_name(),
            "host shut down cleanly"
        );
    }
}
