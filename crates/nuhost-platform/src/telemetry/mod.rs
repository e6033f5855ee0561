//! Trace routing and relay.
//!
//! Services name the `tracing` targets they emit under as [`EventSource`]s.
//! When a service starts, the host asks the installed [`EventRouting`] to
//! enable those targets; [`RelayLayer`] then forwards every event that passes
//! the filter to a [`crate::hosting::HostEventSink`].

mod relay;
mod routing;

use std::borrow::Cow;
use std::fmt;

pub use relay::{LogEventEntry, RelayLayer, relay_subscriber};
pub use routing::{EventRouting, FilterRouting, NoopRouting, RoutingError};

/// A `tracing` target a service emits events under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventSource {
    target: Cow<'static, str>,
}

impl EventSource {
    /// Names a static target, typically `env!("CARGO_PKG_NAME")` of the service crate.
    #[must_use]
    pub const fn new(target: &'static str) -> Self {
        Self {
            target: Cow::Borrowed(target),
        }
    }

    /// Names a target computed at runtime.
    #[must_use]
    pub fn owned(target: impl Into<String>) -> Self {
        Self {
            target: Cow::Owned(target.into()),
        }
    }

    /// Target name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}
