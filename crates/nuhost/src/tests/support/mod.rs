//! Fixtures shared by the launcher test suites.

use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex};

use camino::Utf8PathBuf;
use nuhost_config::HostSettings;
use nuhost_platform::service::ServiceCatalog;
use nuhost_platform::testing::{Script, ScriptedService};
use nuhost_platform::{HostEvent, ServiceHostDescription, StartOptions};

use crate::process::{ShutdownError, ShutdownSignal};

/// Binds an ephemeral loopback port.
pub const EPHEMERAL_URL: &str = "http://127.0.0.1:0/";

pub fn catalog() -> ServiceCatalog {
    ServiceCatalog::new()
        .with(ScriptedService::definition("Alpha", Script::default()))
        .with(ScriptedService::definition("Broken", Script::failing("boom")))
        .with(ScriptedService::definition("Shy", Script::declining()))
}

pub fn settings(services: &[&str]) -> HostSettings {
    HostSettings {
        services: services.iter().map(|name| (*name).to_owned()).collect(),
        urls: vec![EPHEMERAL_URL.to_owned()],
        configuration: Some("{}".to_owned()),
        base_directory: Some(Utf8PathBuf::from("/srv/nuhost")),
        ..HostSettings::default()
    }
}

pub fn options(services: &[&str]) -> StartOptions {
    let mut options = StartOptions::new(ServiceHostDescription::local("test", 7));
    options.services = services.iter().map(|name| (*name).to_owned()).collect();
    options.urls = vec![EPHEMERAL_URL.to_owned()];
    options.configuration = Some(Default::default());
    options
}

/// Lifecycle events only, without relayed traces.
pub fn lifecycle(events: Vec<HostEvent>) -> Vec<HostEvent> {
    events
        .into_iter()
        .filter(|event| !matches!(event, HostEvent::Log { .. }))
        .collect()
}

/// A shutdown signal fired by the test.
#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn triggered() -> Self {
        let signal = Self::new();
        signal.trigger();
        signal
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}

/// An owned writer whose bytes stay readable after it moves to a thread.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8(self.bytes.lock().expect("buffer mutex poisoned").clone())
            .expect("utf-8 output")
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.text()
            .lines()
            .map(|line| serde_json::from_str(line).expect("event line"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("buffer mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
