//! A sample service that exercises the NuHost HTTP multiplexer.
//!
//! `Echo` mounts under `/echo` and offers:
//!
//! - `GET /echo?message=<text>` repeats the message back as plain text.
//! - `GET /adminsOnly` greets callers holding the admin role and challenges
//!   everyone else.
//! - `GET /adminsGetExtra` greets everyone, with extras for signed-in admins.
//! - `GET /throw` panics, showing how failures become a generic 500.
//! - `GET /` lists the operations above.

mod routes;

use async_trait::async_trait;
use nuhost_platform::service::HttpSurface;
use nuhost_platform::telemetry::EventSource;
use nuhost_platform::{Service, ServiceCore, ServiceDefinition, ServiceError, ServiceScope};

/// Name the service is catalogued under.
pub const SERVICE_NAME: &str = "Echo";

/// Path the service is mounted under.
pub const BASE_PATH: &str = "/echo";

/// Trace target of the service's own events.
pub const ECHO_TARGET: &str = "nuhost_echo";

/// Reply sent when no message was supplied.
pub const EMPTY_MESSAGE_REPLY: &str =
    "Put something in the 'message' query string parameter and I'll repeat it!";

/// Repeats messages over HTTP.
#[derive(Debug)]
pub struct EchoService {
    core: ServiceCore,
}

impl EchoService {
    /// Builds the service around the core handed out by the host.
    #[must_use]
    pub const fn new(core: ServiceCore) -> Self {
        Self { core }
    }

    /// Catalog entry for the service.
    #[must_use]
    pub fn definition() -> ServiceDefinition {
        ServiceDefinition::new(SERVICE_NAME, Self::new)
    }
}

#[async_trait]
impl Service for EchoService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    async fn start(&self, _scope: &ServiceScope) -> Result<bool, ServiceError> {
        tracing::info!(
            target: ECHO_TARGET,
            event = "echo_ready",
            service = %self.name(),
            "echo service ready"
        );
        Ok(true)
    }

    fn event_sources(&self) -> Vec<EventSource> {
        vec![EventSource::new(ECHO_TARGET)]
    }

    fn http(&self) -> Option<HttpSurface> {
        Some(HttpSurface::new(self.name(), routes::router()).with_base_path(BASE_PATH))
    }
}
