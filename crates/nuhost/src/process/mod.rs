//! Launcher process control: settings, signals and the event loop.

mod errors;
pub(crate) mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::{LaunchPlan, run_launcher, run_launcher_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal, watch_signal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
