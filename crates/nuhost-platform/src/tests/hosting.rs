//! The bootstrap contract: options, relayed events and shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;

use nuhost_config::{FnSettings, SettingSource};
use rstest::rstest;
use serde_json::json;
use tokio::sync::mpsc;

use super::support::description;
use crate::host::HostError;
use crate::hosting::{
    ApplicationHost, HostControl, HostEvent, HostingError, LocalApplicationHost,
    PROTOCOL_VERSION, StartOptions, deepest_message,
};
use crate::service::{ServiceCatalog, ServiceError};
use crate::testing::{
    LifecycleEvent, RecordingEventSink, RecordingHostReporter, Script, ScriptedService,
};

fn catalog() -> ServiceCatalog {
    ServiceCatalog::new()
        .with(ScriptedService::definition("Alpha", Script::default()))
        .with(ScriptedService::definition("Beta", Script::default()))
        .with(ScriptedService::definition("Broken", Script::failing("boom")))
        .with(ScriptedService::definition("Shy", Script::declining()))
}

fn options(services: &[&str]) -> StartOptions {
    let mut options = StartOptions::new(description());
    options.services = services.iter().map(|name| (*name).to_owned()).collect();
    options.configuration = Some(BTreeMap::new());
    options
}

#[tokio::test]
async fn relays_start_and_shutdown_around_a_cancelled_run() {
    let host = LocalApplicationHost::new(catalog());
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let control = HostControl::new(Arc::new(sender));
    let shutdown = control.shutdown.clone();

    let (result, started) = tokio::join!(
        host.run_async(options(&["alpha", "beta"]), control),
        async move {
            let first = receiver.recv().await;
            shutdown.cancel();
            (first, receiver)
        }
    );
    result.expect("host runs cleanly");

    let (first, mut receiver) = started;
    assert_eq!(first, Some(HostEvent::Started { success: true }));
    assert_eq!(
        receiver.recv().await,
        Some(HostEvent::Shutdown { error: None })
    );
}

#[tokio::test]
async fn failed_start_reports_the_deepest_error() {
    let host = LocalApplicationHost::new(catalog());
    let sink = Arc::new(RecordingEventSink::default());
    let control = HostControl::new(sink.clone());

    let error = host
        .run_async(options(&["Alpha", "Broken"]), control)
        .await
        .expect_err("start fails");
    assert!(matches!(
        error,
        HostingError::Host {
            source: HostError::StartFailed { .. }
        }
    ));
    assert_eq!(
        sink.events(),
        vec![
            HostEvent::Started { success: false },
            HostEvent::Shutdown {
                error: Some("boom".to_owned())
            },
        ]
    );
}

#[tokio::test]
async fn declined_start_is_unsuccessful_but_not_an_error() {
    let host = LocalApplicationHost::new(catalog());
    let sink = Arc::new(RecordingEventSink::default());

    host.run_async(options(&["Alpha", "Shy"]), HostControl::new(sink.clone()))
        .await
        .expect("declining is not an error");
    assert_eq!(
        sink.events(),
        vec![
            HostEvent::Started { success: false },
            HostEvent::Shutdown { error: None },
        ]
    );
}

#[tokio::test]
async fn duplicate_selection_fails_initialisation() {
    let host = LocalApplicationHost::new(catalog());
    let sink = Arc::new(RecordingEventSink::default());

    let error = host
        .run_async(options(&["Alpha", "alpha"]), HostControl::new(sink.clone()))
        .await
        .expect_err("duplicates rejected");
    assert!(matches!(
        error,
        HostingError::Host {
            source: HostError::DuplicateService { .. }
        }
    ));
    assert_eq!(sink.events().len(), 2);
    assert!(matches!(
        sink.events().last(),
        Some(HostEvent::Shutdown { error: Some(_) })
    ));
}

#[tokio::test]
async fn newer_protocols_are_refused_before_anything_runs() {
    let reporter = Arc::new(RecordingHostReporter::default());
    let host = LocalApplicationHost::new(catalog()).with_reporter(reporter.clone());
    let sink = Arc::new(RecordingEventSink::default());
    let mut options = options(&["Alpha"]);
    options.protocol_version = PROTOCOL_VERSION + 1;

    let error = host
        .run_async(options, HostControl::new(sink.clone()))
        .await
        .expect_err("protocol refused");
    assert!(matches!(
        error,
        HostingError::UnsupportedProtocol { requested, supported }
            if requested == PROTOCOL_VERSION + 1 && supported == PROTOCOL_VERSION
    ));
    assert!(sink.events().is_empty());
    assert!(reporter.events().is_empty());
}

#[tokio::test]
async fn selects_services_by_name_and_skips_unknown_ones() {
    let reporter = Arc::new(RecordingHostReporter::default());
    let host = LocalApplicationHost::new(catalog()).with_reporter(reporter.clone());
    let sink = Arc::new(RecordingEventSink::default());
    let control = HostControl::new(sink.clone());
    control.shutdown.cancel();

    host.run_async(options(&["BETA", "missing"]), control)
        .await
        .expect("host runs cleanly");
    let initialising: Vec<LifecycleEvent> = reporter
        .events()
        .into_iter()
        .filter(|event| matches!(event, LifecycleEvent::ServiceInitialising(_)))
        .collect();
    assert_eq!(
        initialising,
        vec![LifecycleEvent::ServiceInitialising("Beta".to_owned())]
    );
}

#[rstest]
fn blocking_run_drives_its_own_runtime() {
    let host = LocalApplicationHost::new(catalog());
    let sink = Arc::new(RecordingEventSink::default());
    let control = HostControl::new(sink.clone());
    control.shutdown.cancel();

    host.run(options(&["Alpha"]), control)
        .expect("host runs cleanly");
    assert_eq!(
        sink.events(),
        vec![
            HostEvent::Started { success: true },
            HostEvent::Shutdown { error: None },
        ]
    );
}

#[rstest]
fn settings_prefer_the_provider_then_the_static_map() {
    let mut options = StartOptions::new(description());
    options.configuration = Some(BTreeMap::from([(
        "Host.Name".to_owned(),
        "from-map".to_owned(),
    )]));
    assert_eq!(
        options.settings_source().get_setting("Host.Name").as_deref(),
        Some("from-map")
    );

    let provider: Arc<dyn SettingSource> = Arc::new(FnSettings::new(|name: &str| {
        (name == "Host.Name").then(|| "from-provider".to_owned())
    }));
    options.configuration_provider = Some(provider);
    assert_eq!(
        options.settings_source().get_setting("Host.Name").as_deref(),
        Some("from-provider")
    );
}

#[rstest]
fn options_default_to_the_current_protocol() {
    let options: StartOptions = serde_json::from_value(json!({
        "description": {
            "instanceName": "nuget-local-0-test_IN0",
            "machineName": "test-machine"
        },
        "services": ["Echo"]
    }))
    .expect("options parse");
    assert_eq!(options.protocol_version, PROTOCOL_VERSION);
    assert_eq!(options.services, ["Echo"]);
    assert!(options.configuration.is_none());
    assert_eq!(options.description, description());
}

#[rstest]
fn events_use_snake_case_tags() {
    let started = serde_json::to_value(HostEvent::Started { success: true }).expect("serialise");
    assert_eq!(started, json!({"event": "started", "success": true}));
    let stopped = serde_json::to_value(HostEvent::Shutdown { error: None }).expect("serialise");
    assert_eq!(stopped, json!({"event": "shutdown"}));
}

#[rstest]
fn deepest_message_follows_the_source_chain() {
    let inner = std::io::Error::other("disk unplugged");
    let error = HostError::StartFailed {
        service: crate::model::ServiceName::new(
            description().instance_name().clone(),
            "Store",
        ),
        source: ServiceError::with_source("cannot open", inner),
    };
    assert_eq!(deepest_message(&error), "disk unplugged");
}
