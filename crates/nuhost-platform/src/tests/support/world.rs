//! BDD world for host lifecycle scenarios: collects service definitions,
//! drives the host on a private runtime and keeps each step's outcome.

use std::cell::RefCell;
use std::sync::Arc;

use tokio::runtime::Runtime;

use super::{HostFixture, settings};
use crate::host::{HostError, HostState};
use crate::service::{IntoAny, Service, ServiceDefinition};
use crate::testing::{LifecycleEvent, RecordingHostReporter, Script, ScriptedService};

pub struct HostWorld {
    runtime: Runtime,
    definitions: Vec<ServiceDefinition>,
    fixture: Option<HostFixture>,
    initialise_result: Option<Result<(), HostError>>,
    start_result: Option<Result<bool, HostError>>,
    run_result: Option<Result<(), HostError>>,
}

impl HostWorld {
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime");
        Self {
            runtime,
            definitions: Vec::new(),
            fixture: None,
            initialise_result: None,
            start_result: None,
            run_result: None,
        }
    }

    pub fn add_service(&mut self, name: &str, script: Script) {
        self.definitions
            .push(ScriptedService::definition(name, script));
    }

    fn fixture(&mut self) -> &HostFixture {
        let definitions = std::mem::take(&mut self.definitions);
        self.fixture
            .get_or_insert_with(|| HostFixture::new(definitions, settings(&[])))
    }

    pub fn initialise(&mut self) {
        let result = self.fixture().host.initialise();
        self.initialise_result = Some(result);
    }

    pub fn start(&mut self) {
        self.initialise();
        if let Some(Err(error)) = &self.initialise_result {
            panic!("initialisation failed: {error}");
        }
        let fixture = self.fixture.as_ref().expect("fixture built");
        let result = self.runtime.block_on(fixture.host.start());
        self.start_result = Some(result);
    }

    pub fn shutdown(&mut self) {
        self.fixture().host.shutdown();
    }

    pub fn run(&mut self) {
        let fixture = self.fixture.as_ref().expect("fixture built");
        let result = self.runtime.block_on(fixture.host.run());
        self.run_result = Some(result);
    }

    pub fn initialise_result(&self) -> Option<&Result<(), HostError>> {
        self.initialise_result.as_ref()
    }

    pub fn start_result(&self) -> Option<&Result<bool, HostError>> {
        self.start_result.as_ref()
    }

    pub fn run_result(&self) -> Option<&Result<(), HostError>> {
        self.run_result.as_ref()
    }

    pub fn state(&self) -> HostState {
        self.fixture.as_ref().expect("fixture built").host.state()
    }

    pub fn instance(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.fixture
            .as_ref()
            .expect("fixture built")
            .host
            .get_instance(name)
    }

    pub fn scripted(&self, name: &str) -> Option<Arc<ScriptedService>> {
        self.instance(name)?.into_any().downcast::<ScriptedService>().ok()
    }

    pub fn reporter(&self) -> &RecordingHostReporter {
        &self.fixture.as_ref().expect("fixture built").reporter
    }

    pub fn count(&self, event: &LifecycleEvent) -> usize {
        self.reporter().count(event)
    }
}

pub fn world() -> RefCell<HostWorld> {
    RefCell::new(HostWorld::new())
}
