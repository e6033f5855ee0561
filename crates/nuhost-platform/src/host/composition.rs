use std::any::Any;
use std::sync::Arc;

use nuhost_config::ConfigurationHub;

use super::HostHandle;
use crate::certificates::{CertificateHub, CertificateStore};
use crate::clock::Clock;
use crate::credentials::CredentialHub;
use crate::model::ServiceHostDescription;
use crate::service::ComponentMap;

/// Host-wide components shared read-only by every service scope.
///
/// Registers the configuration, certificate and credential hubs, the host
/// handle and the host description so services can resolve them by type.
#[derive(Debug)]
pub struct Composition {
    config: ConfigurationHub,
    certificates: Arc<CertificateHub>,
    credentials: Arc<CredentialHub>,
    clock: Arc<dyn Clock>,
    host: HostHandle,
    components: ComponentMap,
}

impl Composition {
    pub(crate) fn new(host: HostHandle, store: Arc<dyn CertificateStore>) -> Self {
        let config = host.config().clone();
        let clock = Arc::clone(host.clock());
        let certificates = Arc::new(CertificateHub::new(
            store,
            config.clone(),
            Arc::clone(&clock),
        ));
        let credentials = Arc::new(CredentialHub::new(Arc::clone(&certificates)));

        let mut components = ComponentMap::default();
        components.insert(Arc::new(config.clone()));
        components.insert(Arc::clone(&certificates));
        components.insert(Arc::clone(&credentials));
        components.insert(Arc::new(host.clone()));
        components.insert(Arc::new(host.description().clone()));

        Self {
            config,
            certificates,
            credentials,
            clock,
            host,
            components,
        }
    }

    /// Resolves a host-wide component by type.
    #[must_use]
    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.components.get::<T>()
    }

    /// Host-wide settings.
    #[must_use]
    pub const fn config(&self) -> &ConfigurationHub {
        &self.config
    }

    /// Certificate queries.
    #[must_use]
    pub fn certificates(&self) -> &Arc<CertificateHub> {
        &self.certificates
    }

    /// Management credentials.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialHub> {
        &self.credentials
    }

    /// Owning host.
    #[must_use]
    pub const fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Host clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}
