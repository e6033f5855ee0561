//! Execution contexts that keep the host apart from the launcher.
//!
//! The launcher only ever speaks the bootstrap contract: it hands
//! [`StartOptions`] to an [`IsolationContext`] and reads [`HostEvent`]s from
//! the sink in the [`HostControl`]. [`ThreadIsolation`] keeps the host in
//! this process on a thread of its own; [`ProcessIsolation`] re-executes the
//! launcher binary as an agent and relays the same contract over stdio.
//!
//! [`HostEvent`]: nuhost_platform::HostEvent

mod agent;
mod process;
mod thread;

use std::io;
use std::process::ExitStatus;
use std::thread::JoinHandle;

use nuhost_platform::hosting::HostingError;
use nuhost_platform::telemetry::RoutingError;
use nuhost_platform::{HostControl, StartOptions};
use thiserror::Error;

pub use agent::{AGENT_COMMAND, AgentCommand, run_agent};
pub use process::ProcessIsolation;
pub use thread::ThreadIsolation;

pub(crate) const ISOLATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::isolation");

/// Somewhere a host can run without sharing the launcher's state.
pub trait IsolationContext: Send + Sync {
    /// Starts the host and returns at once; events flow to `control.events`
    /// until the host stops.
    fn start(
        &self,
        options: StartOptions,
        control: HostControl,
    ) -> Result<IsolatedHost, IsolationError>;
}

/// A host running inside an isolation context.
#[derive(Debug)]
pub struct IsolatedHost {
    thread: JoinHandle<Result<(), IsolationError>>,
}

impl IsolatedHost {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self, IsolationError>
    where
        F: FnOnce() -> Result<(), IsolationError> + Send + 'static,
    {
        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(body)
            .map(|thread| Self { thread })
            .map_err(|source| IsolationError::Spawn { source })
    }

    /// Blocks until the host has stopped.
    pub fn join(self) -> Result<(), IsolationError> {
        self.thread.join().map_err(|_| IsolationError::Panicked)?
    }
}

/// Errors raised while running a host in isolation.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// The thread or child process could not be started.
    #[error("failed to start the isolated host: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The trace relay could not be installed.
    #[error("failed to install the trace relay: {source}")]
    Relay {
        /// Underlying routing error.
        #[source]
        source: RoutingError,
    },
    /// The host itself failed.
    #[error("host failed: {source}")]
    Hosting {
        /// Underlying bootstrap error.
        #[source]
        source: HostingError,
    },
    /// Callback configuration was supplied to an out-of-process host.
    #[error("a configuration callback cannot cross a process boundary")]
    CallbackConfiguration,
    /// Reading from or writing to the agent failed.
    #[error("agent i/o failed: {source}")]
    Agent {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A message on the agent channel could not be encoded or decoded.
    #[error("malformed agent message: {source}")]
    Protocol {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The agent received something other than a start command first.
    #[error("expected a start command, received '{command}'")]
    UnexpectedCommand {
        /// Command that arrived instead.
        command: String,
    },
    /// The agent input closed before a start command arrived.
    #[error("agent input closed before a start command arrived")]
    MissingStart,
    /// The agent process exited unsuccessfully.
    #[error("agent exited with {status}")]
    AgentExited {
        /// Exit status of the agent.
        status: ExitStatus,
    },
    /// The thread running the host panicked.
    #[error("the isolated host panicked")]
    Panicked,
}

impl From<HostingError> for IsolationError {
    fn from(source: HostingError) -> Self {
        Self::Hosting { source }
    }
}
