use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, reload};

use super::EventSource;

/// Errors raised while rerouting trace targets.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The rebuilt filter expression was rejected.
    #[error("invalid trace filter '{directives}': {message}")]
    Filter {
        /// Expression that failed to parse.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The subscriber owning the filter has gone away.
    #[error("failed to reload trace filter: {source}")]
    Reload {
        /// Underlying reload error.
        #[source]
        source: reload::Error,
    },
}

/// Routes service event sources to the shared log sink.
pub trait EventRouting: Send + Sync {
    /// Lets events from `source` through at `level` or more severe.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when the filter could not be updated.
    fn enable(&self, source: &EventSource, level: LevelFilter) -> Result<(), RoutingError>;
}

impl<T> EventRouting for Arc<T>
where
    T: EventRouting + ?Sized,
{
    fn enable(&self, source: &EventSource, level: LevelFilter) -> Result<(), RoutingError> {
        (**self).enable(source, level)
    }
}

/// Routing for hosts whose subscriber is configured elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRouting;

impl EventRouting for NoopRouting {
    fn enable(&self, _source: &EventSource, _level: LevelFilter) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Routing that rewrites a reloadable [`EnvFilter`].
///
/// The filter is the base expression followed by one `target=level`
/// directive per enabled source. Enabling a source never lowers its level.
pub struct FilterRouting<S> {
    base: String,
    enabled: Mutex<BTreeMap<String, LevelFilter>>,
    handle: reload::Handle<EnvFilter, S>,
}

impl<S> FilterRouting<S> {
    /// Builds the reloadable filter layer and the routing that controls it.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Filter`] when `base` is not a valid filter.
    pub fn layer(base: &str) -> Result<(reload::Layer<EnvFilter, S>, Self), RoutingError> {
        let filter = parse(base)?;
        let (layer, handle) = reload::Layer::new(filter);
        Ok((
            layer,
            Self {
                base: base.to_owned(),
                enabled: Mutex::new(BTreeMap::new()),
                handle,
            },
        ))
    }

    /// Filter expression currently in force.
    #[must_use]
    pub fn directives(&self) -> String {
        let enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
        render(&self.base, &enabled)
    }
}

impl<S> EventRouting for FilterRouting<S>
where
    S: 'static,
{
    fn enable(&self, source: &EventSource, level: LevelFilter) -> Result<(), RoutingError> {
        let directives = {
            let mut enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
            let current = enabled
                .entry(source.target().to_owned())
                .or_insert(LevelFilter::OFF);
            if level > *current {
                *current = level;
            }
            render(&self.base, &enabled)
        };
        let filter = parse(&directives)?;
        self.handle
            .reload(filter)
            .map_err(|source| RoutingError::Reload { source })
    }
}

impl<S> fmt::Debug for FilterRouting<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRouting")
            .field("directives", &self.directives())
            .finish_non_exhaustive()
    }
}

fn parse(directives: &str) -> Result<EnvFilter, RoutingError> {
    EnvFilter::try_new(directives).map_err(|error| RoutingError::Filter {
        directives: directives.to_owned(),
        message: error.to_string(),
    })
}

fn render(base: &str, enabled: &BTreeMap<String, LevelFilter>) -> String {
    let mut directives: Vec<String> = Vec::with_capacity(enabled.len() + 1);
    if !base.trim().is_empty() {
        directives.push(base.trim().to_owned());
    }
    directives.extend(
        enabled
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing_subscriber::Registry;
    use tracing_subscriber::filter::LevelFilter;

    use super::{EventRouting, FilterRouting};
    use crate::telemetry::EventSource;

    #[rstest]
    fn enabling_elevates_but_never_lowers() {
        let (_layer, routing) = FilterRouting::<Registry>::layer("warn").expect("valid filter");
        let source = EventSource::new("nuhost_echo");

        // The layer is still alive, so reloads succeed.
        routing.enable(&source, LevelFilter::INFO).expect("enable info");
        routing.enable(&source, LevelFilter::TRACE).expect("enable trace");
        routing.enable(&source, LevelFilter::INFO).expect("enable info again");

        assert_eq!(routing.directives(), "warn,nuhost_echo=trace");
    }

    #[rstest]
    fn rejects_invalid_base_filter() {
        assert!(FilterRouting::<Registry>::layer("nuhost=loudest").is_err());
    }
}
