//! Supervises one launcher run: settings, isolation and console output.

use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use nuhost_config::{HostSettings, IsolationMode};
use nuhost_platform::service::ServiceCatalog;
use nuhost_platform::{BuildInfo, HostControl, HostEvent, ServiceHostDescription, StartOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal, watch_signal};
use super::PROCESS_TARGET;
use crate::console::Console;
use crate::isolation::{IsolationContext, ProcessIsolation, ThreadIsolation};
use crate::settings::{SettingsLoader, SystemSettingsLoader};
use crate::telemetry;

/// Collaborators required for one launcher run.
pub struct LaunchPlan<L, S> {
    /// Loads the launcher settings.
    pub loader: L,
    /// Fires when the host should shut down.
    pub shutdown: S,
    /// Services the launcher can host.
    pub catalog: ServiceCatalog,
    /// Overrides the isolation context chosen by the settings.
    pub isolation: Option<Arc<dyn IsolationContext>>,
}

/// Runs the launcher with the production collaborators.
pub fn run_launcher<W, E>(args: &[OsString], stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    let plan = LaunchPlan {
        loader: SystemSettingsLoader,
        shutdown: SystemShutdownSignal,
        catalog: crate::catalog(),
        isolation: None,
    };
    run_launcher_with(plan, args, stdout, stderr)
}

/// Runs the launcher with injected collaborators.
///
/// Failures before the banner go to `stderr`; everything after it goes to
/// the console on `stdout`.
pub fn run_launcher_with<L, S, W, E>(
    plan: LaunchPlan<L, S>,
    args: &[OsString],
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    L: SettingsLoader,
    S: ShutdownSignal + 'static,
    W: Write,
    E: Write,
{
    match launch(plan, args, stdout) {
        Ok(code) => code,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn launch<L, S, W>(
    plan: LaunchPlan<L, S>,
    args: &[OsString],
    stdout: &mut W,
) -> Result<ExitCode, LaunchError>
where
    L: SettingsLoader,
    S: ShutdownSignal + 'static,
    W: Write,
{
    let LaunchPlan {
        loader,
        shutdown,
        catalog,
        isolation,
    } = plan;

    let settings = loader.load(args)?;
    telemetry::initialise(&settings)?;
    let options = start_options(&settings)?;
    let base_directory = options.application_base.clone().unwrap_or_default();

    let mut console = Console::new(stdout);
    console
        .banner(&BuildInfo::platform(), &base_directory)
        .map_err(|source| LaunchError::Console { source })?;

    let isolation = match isolation {
        Some(isolation) => isolation,
        None => isolation_for(&settings, catalog)?,
    };
    info!(
        target: PROCESS_TARGET,
        isolation = %settings.isolation(),
        instance = %options.description.instance_name(),
        services = ?options.services,
        urls = ?options.urls,
        "launching host"
    );

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let control = HostControl::new(Arc::new(sender));
    watch_signal(shutdown, control.shutdown.clone())
        .map_err(|source| LaunchError::Signals { source })?;
    let host = isolation.start(options, control)?;

    let mut started = false;
    let mut failure_shown = false;
    while let Some(event) = receiver.blocking_recv() {
        match &event {
            HostEvent::Started { success } => started = *success,
            HostEvent::Shutdown { error: Some(_) } => failure_shown = true,
            HostEvent::Shutdown { error: None } | HostEvent::Log { .. } => {}
        }
        if let Err(error) = console.render(&event) {
            warn!(target: PROCESS_TARGET, error = %error, "failed to render host event");
        }
    }

    let joined = host.join();
    if let Err(error) = &joined {
        warn!(target: PROCESS_TARGET, error = %error, "host stopped with an error");
        if !failure_shown {
            console
                .failure(error)
                .map_err(|source| LaunchError::Console { source })?;
        }
    }
    info!(target: PROCESS_TARGET, started, "launcher finished");
    Ok(if started && joined.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Builds the bootstrap options from launcher settings.
pub(crate) fn start_options(settings: &HostSettings) -> Result<StartOptions, LaunchError> {
    let mut options = StartOptions::new(ServiceHostDescription::local(
        settings.host_name(),
        std::process::id(),
    ));
    options.services.clone_from(&settings.services);
    options.urls = settings.bind_urls();
    options.configuration = settings.configuration_map()?;
    options.application_base = Some(base_directory(settings)?);
    Ok(options)
}

fn base_directory(settings: &HostSettings) -> Result<Utf8PathBuf, LaunchError> {
    if let Some(directory) = &settings.base_directory {
        return Ok(directory.clone());
    }
    let current = env::current_dir().map_err(|source| LaunchError::BaseDirectory { source })?;
    Utf8PathBuf::from_path_buf(current).map_err(|path| LaunchError::NonUtf8BaseDirectory { path })
}

fn isolation_for(
    settings: &HostSettings,
    catalog: ServiceCatalog,
) -> Result<Arc<dyn IsolationContext>, LaunchError> {
    Ok(match settings.isolation() {
        IsolationMode::Thread => Arc::new(ThreadIsolation::new(catalog, settings.log_filter())),
        IsolationMode::Process => Arc::new(ProcessIsolation::current(settings.log_filter())?),
    })
}
