//! The NuHost launcher.
//!
//! `nuhost` loads its settings through `ortho_config`, prints a banner, and
//! starts the host inside an isolation context: a dedicated thread by
//! default, or a child process re-executing this binary as `nuhost agent`.
//! Host events come back across that boundary and are rendered on the
//! console; Ctrl-C or `SIGTERM` asks the host to shut down and the launcher
//! waits for it to finish before exiting.

mod console;
mod isolation;
mod process;
mod settings;
mod telemetry;

use std::ffi::OsString;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;

use nuhost_config::HostSettings;
use nuhost_echo::EchoService;
use nuhost_platform::service::ServiceCatalog;

pub use console::{Console, FAILED_TO_START};
pub use isolation::{
    AGENT_COMMAND, AgentCommand, IsolatedHost, IsolationContext, IsolationError,
    ProcessIsolation, ThreadIsolation, run_agent,
};
pub use process::{
    LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, SystemShutdownSignal,
    run_launcher_with,
};
pub use settings::{SettingsLoader, StaticSettingsLoader, SystemSettingsLoader};
pub use telemetry::{TelemetryError, TelemetryHandle};

/// Services this launcher can host.
#[must_use]
pub fn catalog() -> ServiceCatalog {
    ServiceCatalog::new().with(EchoService::definition())
}

/// Whether `args` ask for agent mode.
#[must_use]
pub fn is_agent_invocation(args: &[OsString]) -> bool {
    args.get(1).is_some_and(|argument| argument == AGENT_COMMAND)
}

/// Runs the launcher using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    process::run_launcher(&args, stdout, stderr)
}

/// Serves the agent protocol on the process's stdin and stdout.
#[must_use]
pub fn run_agent_process<E: Write>(stderr: &mut E) -> ExitCode {
    if let Err(error) = telemetry::initialise(&HostSettings::default()) {
        let _ = writeln!(stderr, "{error}");
    }
    match run_agent(
        BufReader::new(io::stdin()),
        io::stdout(),
        catalog(),
        SystemShutdownSignal,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
