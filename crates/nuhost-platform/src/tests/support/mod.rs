//! Fixtures shared by the platform test suites.

mod routing;
mod world;

use std::collections::BTreeMap;
use std::sync::Arc;

use nuhost_config::StaticSettings;
use time::OffsetDateTime;

use crate::clock::FixedClock;
use crate::host::ServiceHost;
use crate::model::{ServiceHostDescription, ServiceHostInstanceName};
use crate::service::ServiceDefinition;
use crate::testing::{RecordingHostReporter, RecordingHttpTraceReporter};

pub use routing::RecordingRouting;
pub use world::{HostWorld, world};

/// 2030-01-01T00:00:00Z, inside the fixture certificates' validity window.
pub const VALID_AT: i64 = 1_893_456_000;

pub fn description() -> ServiceHostDescription {
    ServiceHostDescription::new(
        ServiceHostInstanceName::new("nuget-local-0-test", 0),
        "test-machine",
    )
}

pub fn at(timestamp: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(timestamp).expect("valid timestamp")
}

pub fn settings(pairs: &[(&str, &str)]) -> StaticSettings {
    StaticSettings::new(
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// A host wired to recording doubles.
pub struct HostFixture {
    pub host: ServiceHost,
    pub reporter: Arc<RecordingHostReporter>,
    pub trace: Arc<RecordingHttpTraceReporter>,
    pub routing: Arc<RecordingRouting>,
    pub clock: Arc<FixedClock>,
}

impl HostFixture {
    pub fn new(definitions: Vec<ServiceDefinition>, settings: StaticSettings) -> Self {
        Self::with_urls(definitions, settings, Vec::new())
    }

    pub fn with_urls(
        definitions: Vec<ServiceDefinition>,
        settings: StaticSettings,
        urls: Vec<String>,
    ) -> Self {
        let reporter = Arc::new(RecordingHostReporter::default());
        let trace = Arc::new(RecordingHttpTraceReporter::default());
        let routing = Arc::new(RecordingRouting::default());
        let clock = Arc::new(FixedClock::new(at(VALID_AT)));
        let host = ServiceHost::builder(description(), Arc::new(settings))
            .services(definitions)
            .urls(urls)
            .reporter(reporter.clone())
            .http_trace(trace.clone())
            .routing(routing.clone())
            .clock(clock.clone())
            .build();
        Self {
            host,
            reporter,
            trace,
            routing,
            clock,
        }
    }

    /// Initialises and starts the host, returning the aggregate start result.
    pub async fn start(&self) -> bool {
        self.host.initialise().expect("host initialises");
        self.host.start().await.expect("host starts")
    }
}
