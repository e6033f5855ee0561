//! The NuHost platform: everything needed to run many services in one process.
//!
//! A [`ServiceHost`](host::ServiceHost) composes a fixed set of
//! [`Service`](service::Service) implementations, starts them concurrently,
//! mounts their HTTP surfaces behind one multiplexed listener and owns the
//! shared shutdown signal. Services resolve settings through the
//! [`ConfigurationHub`](nuhost_config::ConfigurationHub), certificates through
//! the [`CertificateHub`](certificates::CertificateHub) and management
//! credentials through the [`CredentialHub`](credentials::CredentialHub).
//!
//! Launchers never drive the host directly. They go through the
//! [`ApplicationHost`](hosting::ApplicationHost) bootstrap contract, which
//! takes serialisable [`StartOptions`](hosting::StartOptions) and relays
//! [`HostEvent`](hosting::HostEvent)s back, so the same host can run on a
//! dedicated thread or in a child process.

pub mod certificates;
pub mod clock;
pub mod credentials;
pub mod health;
pub mod host;
pub mod hosting;
pub mod http;
pub mod model;
pub mod service;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use credentials::{CredentialError, CredentialHub, Credentials};
pub use host::{HostError, HostHandle, HostState, ServiceHost};
pub use hosting::{ApplicationHost, HostControl, HostEvent, HostEventSink, StartOptions};
pub use model::{BuildInfo, ServiceHostDescription, ServiceHostInstanceName, ServiceName};
pub use service::{Service, ServiceCore, ServiceDefinition, ServiceError, ServiceScope};

#[cfg(test)]
mod tests;
