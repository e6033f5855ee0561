use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry, reload};

use super::routing::{FilterRouting, RoutingError};
use crate::hosting::{HostEvent, HostEventSink};

const MESSAGE_FIELD: &str = "message";
const SERVICE_FIELD: &str = "service";

/// One trace event as relayed across the isolation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEventEntry {
    /// When the event was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Upper-case level name such as `INFO`.
    pub level: String,
    /// `tracing` target the event was emitted under.
    pub target: String,
    /// Formatted message.
    pub message: String,
    /// Remaining structured fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    /// Service whose span enclosed the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Publishes every event it observes as [`HostEvent::Log`].
///
/// The owning service is taken from the nearest enclosing span that records
/// a `service` field; the host opens such a span around each service's start,
/// run loop and HTTP requests.
pub struct RelayLayer {
    sink: Arc<dyn HostEventSink>,
}

impl RelayLayer {
    /// Relays to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn HostEventSink>) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for RelayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayLayer").finish_non_exhaustive()
    }
}

struct ServiceTag(String);

impl<S> Layer<S> for RelayLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = ServiceVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(service), Some(span)) = (visitor.service, ctx.span(id)) {
            span.extensions_mut().insert(ServiceTag(service));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let service = ctx.event_scope(event).and_then(|mut scope| {
            scope.find_map(|span| {
                let extensions = span.extensions();
                extensions.get::<ServiceTag>().map(|tag| tag.0.clone())
            })
        });

        let metadata = event.metadata();
        self.sink.publish(HostEvent::Log {
            entry: LogEventEntry {
                timestamp: OffsetDateTime::now_utc(),
                level: metadata.level().to_string(),
                target: metadata.target().to_owned(),
                message: visitor.message,
                fields: visitor.fields,
                service,
            },
        });
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: BTreeMap<String, Value>,
}

impl EntryVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == MESSAGE_FIELD {
            self.message = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_owned()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

#[derive(Default)]
struct ServiceVisitor {
    service: Option<String>,
}

impl Visit for ServiceVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == SERVICE_FIELD {
            self.service = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == SERVICE_FIELD {
            self.service = Some(value.to_owned());
        }
    }
}

/// Builds a subscriber that relays events passing a reloadable filter.
///
/// The returned routing controls the filter; hosts use it to enable their
/// services' event sources.
///
/// # Errors
///
/// Returns [`RoutingError::Filter`] when `base_filter` is not a valid filter.
pub fn relay_subscriber(
    base_filter: &str,
    sink: Arc<dyn HostEventSink>,
) -> Result<(impl Subscriber + Send + Sync + 'static, FilterRouting<Registry>), RoutingError> {
    let (filter, routing): (reload::Layer<EnvFilter, Registry>, _) =
        FilterRouting::layer(base_filter)?;
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(RelayLayer::new(sink));
    Ok((subscriber, routing))
}
