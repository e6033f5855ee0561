use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ApplicationHost, HostControl, HostEvent, HostingError, PROTOCOL_VERSION, StartOptions,
    deepest_message,
};
use crate::certificates::CertificateStore;
use crate::health::{HostReporter, StructuredHostReporter};
use crate::host::{HOST_TARGET, ServiceHost};
use crate::http::{HttpTraceReporter, StructuredHttpTraceReporter};
use crate::service::ServiceCatalog;

/// Hosts services from a catalog in the current process.
pub struct LocalApplicationHost {
    catalog: ServiceCatalog,
    reporter: Arc<dyn HostReporter>,
    http_trace: Arc<dyn HttpTraceReporter>,
    store: Option<Arc<dyn CertificateStore>>,
}

impl LocalApplicationHost {
    /// Hosts services drawn from `catalog`.
    #[must_use]
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            reporter: Arc::new(StructuredHostReporter::new()),
            http_trace: Arc::new(StructuredHttpTraceReporter),
            store: None,
        }
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HostReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the request observer.
    #[must_use]
    pub fn with_http_trace(mut self, http_trace: Arc<dyn HttpTraceReporter>) -> Self {
        self.http_trace = http_trace;
        self
    }

    /// Overrides the certificate store.
    #[must_use]
    pub fn with_certificate_store(mut self, store: Arc<dyn CertificateStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn build_host(&self, options: &StartOptions, control: &HostControl) -> ServiceHost {
        let builder = ServiceHost::builder(options.description.clone(), options.settings_source())
            .services(self.catalog.select(&options.services))
            .urls(options.urls.clone())
            .reporter(Arc::clone(&self.reporter))
            .http_trace(Arc::clone(&self.http_trace))
            .routing(Arc::clone(&control.routing));
        match &self.store {
            Some(store) => builder.certificate_store(Arc::clone(store)),
            None => builder,
        }
        .build()
    }
}

impl std::fmt::Debug for LocalApplicationHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalApplicationHost")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApplicationHost for LocalApplicationHost {
    async fn run_async(
        &self,
        options: StartOptions,
        control: HostControl,
    ) -> Result<(), HostingError> {
        if options.protocol_version > PROTOCOL_VERSION {
            return Err(HostingError::UnsupportedProtocol {
                requested: options.protocol_version,
                supported: PROTOCOL_VERSION,
            });
        }

        let host = self.build_host(&options, &control);
        if let Err(error) = host.initialise() {
            control.events.publish(HostEvent::Started { success: false });
            control.events.publish(HostEvent::Shutdown {
                error: Some(deepest_message(&error)),
            });
            return Err(error.into());
        }

        match host.start().await {
            Err(error) => {
                control.events.publish(HostEvent::Started { success: false });
                drain(&host).await;
                control.events.publish(HostEvent::Shutdown {
                    error: Some(deepest_message(&error)),
                });
                Err(error.into())
            }
            Ok(false) => {
                control.events.publish(HostEvent::Started { success: false });
                drain(&host).await;
                control.events.publish(HostEvent::Shutdown { error: None });
                Ok(())
            }
            Ok(true) => {
                control.events.publish(HostEvent::Started { success: true });
                let run = host.run();
                tokio::pin!(run);
                let result = tokio::select! {
                    result = &mut run => result,
                    () = control.shutdown.cancelled() => {
                        host.shutdown();
                        run.await
                    }
                };
                control.events.publish(HostEvent::Shutdown {
                    error: result.as_ref().err().map(|error| deepest_message(error)),
                });
                result.map_err(HostingError::from)
            }
        }
    }
}

/// Stops whatever did start after an unsuccessful aggregate start.
async fn drain(host: &ServiceHost) {
    host.shutdown();
    if let Err(error) = host.run().await {
        tracing::warn!(
            target: HOST_TARGET,
            event = "drain_failed",
            error = %error,
            "service faulted while stopping after a failed start"
        );
    }
}
