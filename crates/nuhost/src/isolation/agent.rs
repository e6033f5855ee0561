//! The child side of [`ProcessIsolation`](super::ProcessIsolation).
//!
//! The agent reads one JSON [`AgentCommand::Start`] line from its input,
//! runs the host on a [`ThreadIsolation`] and writes every [`HostEvent`] to
//! its output as a JSON line. A later [`AgentCommand::Shutdown`] line, the
//! end of the input, or a termination signal stops the host.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;

use nuhost_platform::hosting::{HostingError, deepest_message};
use nuhost_platform::service::ServiceCatalog;
use nuhost_platform::{HostControl, HostEvent, HostEventSink, StartOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use super::{ISOLATION_TARGET, IsolationContext, IsolationError, ThreadIsolation};
use crate::process::{ShutdownSignal, watch_signal};

/// First argument that turns the launcher binary into an agent.
pub const AGENT_COMMAND: &str = "agent";

/// Messages the launcher sends to an agent.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Start the host.
    Start {
        /// Bootstrap options.
        options: StartOptions,
        /// Filter for relayed traces.
        #[serde(rename = "logFilter")]
        log_filter: String,
    },
    /// Stop the host.
    Shutdown,
}

impl AgentCommand {
    const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Serves one host over `input` and `output` until it stops.
///
/// Failures that happen before the host could report them are written as a
/// final [`HostEvent::Shutdown`] carrying the error.
pub fn run_agent<R, W, S>(
    mut input: R,
    output: W,
    catalog: ServiceCatalog,
    signal: S,
) -> Result<(), IsolationError>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
    S: ShutdownSignal + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let writer = thread::Builder::new()
        .name("nuhost-agent-output".to_owned())
        .spawn(move || write_events(receiver, output))
        .map_err(|source| IsolationError::Spawn { source })?;
    let events: Arc<dyn HostEventSink> = Arc::new(sender);

    let result = read_start(&mut input).and_then(|(options, log_filter)| {
        let shutdown = CancellationToken::new();
        watch_input(input, shutdown.clone())?;
        watch_signal(signal, shutdown.clone()).map_err(|source| IsolationError::Spawn { source })?;
        let control = HostControl::new(Arc::clone(&events)).with_shutdown(shutdown);
        ThreadIsolation::new(catalog, log_filter)
            .start(options, control)?
            .join()
    });

    if let Err(error) = &result {
        let reported = matches!(
            error,
            IsolationError::Hosting {
                source: HostingError::Host { .. }
            }
        );
        if !reported {
            events.publish(HostEvent::Shutdown {
                error: Some(deepest_message(error)),
            });
        }
    }
    drop(events);
    let written = writer.join().map_err(|_| IsolationError::Panicked)?;
    result.and(written)
}

fn read_start<R: BufRead>(input: &mut R) -> Result<(StartOptions, String), IsolationError> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|source| IsolationError::Agent { source })?;
    if read == 0 {
        return Err(IsolationError::MissingStart);
    }
    match serde_json::from_str(&line).map_err(|source| IsolationError::Protocol { source })? {
        AgentCommand::Start {
            options,
            log_filter,
        } => Ok((options, log_filter)),
        other => Err(IsolationError::UnexpectedCommand {
            command: other.name().to_owned(),
        }),
    }
}

/// Cancels `shutdown` on a shutdown command, at end of input or on a read
/// error. The thread is left to block on input once it has fired.
fn watch_input<R>(mut input: R, shutdown: CancellationToken) -> Result<(), IsolationError>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("nuhost-agent-input".to_owned())
        .spawn(move || {
            let mut line = String::new();
            loop {
                line.clear();
                match input.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => match serde_json::from_str::<AgentCommand>(&line) {
                        Ok(AgentCommand::Shutdown) => break,
                        Ok(command) => tracing::warn!(
                            target: ISOLATION_TARGET,
                            command = command.name(),
                            "ignoring command for a running host"
                        ),
                        Err(error) => tracing::warn!(
                            target: ISOLATION_TARGET,
                            error = %error,
                            "ignoring malformed agent command"
                        ),
                    },
                }
            }
            shutdown.cancel();
        })
        .map(drop)
        .map_err(|source| IsolationError::Spawn { source })
}

fn write_events<W: Write>(
    mut receiver: UnboundedReceiver<HostEvent>,
    mut output: W,
) -> Result<(), IsolationError> {
    while let Some(event) = receiver.blocking_recv() {
        serde_json::to_writer(&mut output, &event)
            .map_err(|source| IsolationError::Protocol { source })?;
        output
            .write_all(b"\n")
            .and_then(|()| output.flush())
            .map_err(|source| IsolationError::Agent { source })?;
    }
    Ok(())
}
