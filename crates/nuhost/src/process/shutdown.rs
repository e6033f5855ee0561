use std::io;
use std::thread;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::PROCESS_TARGET;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for Ctrl-C or `SIGTERM`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ShutdownError::Install { source })?
            .block_on(termination())
    }
}

#[cfg(unix)]
async fn termination() -> Result<(), ShutdownError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|source| ShutdownError::Install { source })?;
    let name = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|source| ShutdownError::Install { source })?;
            "SIGINT"
        }
        _ = terminate.recv() => "SIGTERM",
    };
    info!(target: PROCESS_TARGET, signal = name, "shutdown signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn termination() -> Result<(), ShutdownError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| ShutdownError::Install { source })?;
    info!(target: PROCESS_TARGET, signal = "ctrl-c", "shutdown signal received");
    Ok(())
}

/// Cancels `shutdown` once `signal` fires.
///
/// The watcher runs on a detached thread; it never fires again and is
/// abandoned when the process exits.
pub fn watch_signal<S>(signal: S, shutdown: CancellationToken) -> io::Result<()>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name("nuhost-signals".to_owned())
        .spawn(move || match signal.wait() {
            Ok(()) => shutdown.cancel(),
            Err(error) => warn!(
                target: PROCESS_TARGET,
                error = %error,
                "shutdown signals unavailable; stop the host by closing its input"
            ),
        })
        .map(drop)
}
