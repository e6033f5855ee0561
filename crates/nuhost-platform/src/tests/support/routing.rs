//! Test double for [`EventRouting`] that records enable requests.

use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;

use crate::telemetry::{EventRouting, EventSource, RoutingError};

#[derive(Debug, Default)]
pub struct RecordingRouting {
    enabled: Mutex<Vec<(String, LevelFilter)>>,
}

impl RecordingRouting {
    pub fn enabled(&self) -> Vec<(String, LevelFilter)> {
        self.enabled
            .lock()
            .expect("routing mutex poisoned")
            .clone()
    }
}

impl EventRouting for RecordingRouting {
    fn enable(&self, source: &EventSource, level: LevelFilter) -> Result<(), RoutingError> {
        self.enabled
            .lock()
            .expect("routing mutex poisoned")
            .push((source.target().to_owned(), level));
        Ok(())
    }
}
