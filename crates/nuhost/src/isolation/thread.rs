use std::sync::Arc;

use nuhost_platform::hosting::LocalApplicationHost;
use nuhost_platform::service::ServiceCatalog;
use nuhost_platform::telemetry::relay_subscriber;
use nuhost_platform::{ApplicationHost, HostControl, StartOptions};

use super::{ISOLATION_TARGET, IsolatedHost, IsolationContext, IsolationError};

/// Runs the host on a dedicated OS thread with its own runtime.
///
/// Traces emitted on that thread go to a thread-scoped relay subscriber
/// filtered by `log_filter`, so the host's diagnostics reach the launcher as
/// [`HostEvent::Log`](nuhost_platform::HostEvent::Log) rather than through
/// the launcher's own subscriber.
#[derive(Debug, Clone)]
pub struct ThreadIsolation {
    catalog: ServiceCatalog,
    log_filter: String,
}

impl ThreadIsolation {
    /// Hosts services from `catalog`, relaying traces that pass `log_filter`.
    #[must_use]
    pub fn new(catalog: ServiceCatalog, log_filter: impl Into<String>) -> Self {
        Self {
            catalog,
            log_filter: log_filter.into(),
        }
    }
}

impl IsolationContext for ThreadIsolation {
    fn start(
        &self,
        options: StartOptions,
        control: HostControl,
    ) -> Result<IsolatedHost, IsolationError> {
        let (subscriber, routing) = relay_subscriber(&self.log_filter, Arc::clone(&control.events))
            .map_err(|source| IsolationError::Relay { source })?;
        let control = control.with_routing(Arc::new(routing));
        let host = LocalApplicationHost::new(self.catalog.clone());
        tracing::debug!(
            target: ISOLATION_TARGET,
            instance = %options.description.instance_name(),
            "starting host thread"
        );
        IsolatedHost::spawn("nuhost-host", move || {
            tracing::subscriber::with_default(subscriber, || host.run(options, control))
                .map_err(IsolationError::from)
        })
    }
}
