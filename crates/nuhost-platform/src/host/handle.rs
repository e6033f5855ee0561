use std::fmt;
use std::sync::Arc;

use nuhost_config::ConfigurationHub;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::model::ServiceHostDescription;

struct HandleInner {
    description: ServiceHostDescription,
    shutdown: CancellationToken,
    config: ConfigurationHub,
    clock: Arc<dyn Clock>,
}

/// Cheap, cloneable view of the host handed to every service.
#[derive(Clone)]
pub struct HostHandle {
    inner: Arc<HandleInner>,
}

impl HostHandle {
    pub(crate) fn new(
        description: ServiceHostDescription,
        shutdown: CancellationToken,
        config: ConfigurationHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                description,
                shutdown,
                config,
                clock,
            }),
        }
    }

    /// Description of the owning host.
    #[must_use]
    pub fn description(&self) -> &ServiceHostDescription {
        &self.inner.description
    }

    /// Host-wide settings.
    #[must_use]
    pub fn config(&self) -> &ConfigurationHub {
        &self.inner.config
    }

    /// Host clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Completes once shutdown has been requested.
    pub async fn when_shutdown(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Token cancelled when shutdown is requested.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("description", &self.inner.description)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
