//! Binary entrypoint for the NuHost launcher.
//!
//! With `agent` as its first argument the binary serves the agent protocol
//! on stdio for a parent launcher; otherwise it runs [`nuhost::run`].

use std::ffi::OsString;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();
    // Unlocked handles: signal and host threads log to stderr concurrently.
    let mut stderr = io::stderr();
    if nuhost::is_agent_invocation(&args) {
        return nuhost::run_agent_process(&mut stderr);
    }
    let mut stdout = io::stdout();
    nuhost::run(args, &mut stdout, &mut stderr)
}
