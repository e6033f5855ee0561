//! Console rendering of host events.

use std::error::Error as StdError;
use std::io::{self, Write};

use camino::Utf8Path;
use nuhost_platform::hosting::deepest_message;
use nuhost_platform::{BuildInfo, HostEvent};

/// Printed when the aggregate start did not succeed.
pub const FAILED_TO_START: &str = "failed to start";

/// Writes the launcher's human-readable output.
#[derive(Debug)]
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    /// Console writing to `out`.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Prints the version banner and the base directory.
    pub fn banner(&mut self, build: &BuildInfo, base_directory: &Utf8Path) -> io::Result<()> {
        writeln!(self.out, "NuHost v{} (Commit {})", build.version, build.commit)?;
        writeln!(self.out, "Using Base Directory: {base_directory}")
    }

    /// Prints one relayed event.
    pub fn render(&mut self, event: &HostEvent) -> io::Result<()> {
        match event {
            HostEvent::Started { success: true } => Ok(()),
            HostEvent::Started { success: false } => writeln!(self.out, "{FAILED_TO_START}"),
            HostEvent::Log { entry } => writeln!(
                self.out,
                "[{}]({}) {}",
                entry.target, entry.level, entry.message
            ),
            HostEvent::Shutdown { error: Some(error) } => writeln!(self.out, "{error}"),
            HostEvent::Shutdown { error: None } => self.out.flush(),
        }
    }

    /// Prints the innermost cause of a launcher failure.
    pub fn failure(&mut self, error: &(dyn StdError + 'static)) -> io::Result<()> {
        writeln!(self.out, "{}", deepest_message(error))
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}
