use std::env;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use nuhost_platform::{HostControl, HostEvent, StartOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};

use super::{
    AGENT_COMMAND, AgentCommand, ISOLATION_TARGET, IsolatedHost, IsolationContext, IsolationError,
};

/// Runs the host in a child process speaking the agent protocol on stdio.
#[derive(Debug, Clone)]
pub struct ProcessIsolation {
    program: PathBuf,
    log_filter: String,
}

impl ProcessIsolation {
    /// Runs `program agent` as the child.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, log_filter: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            log_filter: log_filter.into(),
        }
    }

    /// Re-executes the running binary as the child.
    pub fn current(log_filter: impl Into<String>) -> Result<Self, IsolationError> {
        let program = env::current_exe().map_err(|source| IsolationError::Spawn { source })?;
        Ok(Self::new(program, log_filter))
    }
}

impl IsolationContext for ProcessIsolation {
    fn start(
        &self,
        options: StartOptions,
        control: HostControl,
    ) -> Result<IsolatedHost, IsolationError> {
        if options.configuration_provider.is_some() {
            return Err(IsolationError::CallbackConfiguration);
        }
        let start = serde_json::to_string(&AgentCommand::Start {
            options,
            log_filter: self.log_filter.clone(),
        })
        .map_err(|source| IsolationError::Protocol { source })?;
        let program = self.program.clone();
        IsolatedHost::spawn("nuhost-agent-supervisor", move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|source| IsolationError::Spawn { source })?
                .block_on(supervise(program, start, control))
        })
    }
}

async fn supervise(
    program: PathBuf,
    start: String,
    control: HostControl,
) -> Result<(), IsolationError> {
    let mut child = Command::new(&program)
        .arg(AGENT_COMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| IsolationError::Spawn { source })?;
    tracing::info!(
        target: ISOLATION_TARGET,
        program = %program.display(),
        pid = ?child.id(),
        "agent started"
    );

    let mut stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    send(&mut stdin, &start).await?;

    let mut stdin = Some(stdin);
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(|source| IsolationError::Agent { source })? else {
                    break;
                };
                let event: HostEvent = serde_json::from_str(&line)
                    .map_err(|source| IsolationError::Protocol { source })?;
                control.events.publish(event);
            }
            () = control.shutdown.cancelled(), if stdin.is_some() => {
                if let Some(mut pipe) = stdin.take() {
                    let command = serde_json::to_string(&AgentCommand::Shutdown)
                        .map_err(|source| IsolationError::Protocol { source })?;
                    send(&mut pipe, &command).await?;
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|source| IsolationError::Agent { source })?;
    if status.success() {
        Ok(())
    } else {
        Err(IsolationError::AgentExited { status })
    }
}

async fn send(pipe: &mut ChildStdin, line: &str) -> Result<(), IsolationError> {
    let framed = format!("{line}\n");
    pipe.write_all(framed.as_bytes())
        .await
        .map_err(|source| IsolationError::Agent { source })?;
    pipe.flush()
        .await
        .map_err(|source| IsolationError::Agent { source })
}

fn missing_pipe(name: &str) -> IsolationError {
    IsolationError::Agent {
        source: io::Error::other(format!("agent {name} was not captured")),
    }
}
