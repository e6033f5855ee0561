//! The HTTP multiplexer shared by every hosted service.
//!
//! One router serves the whole host. Its pipeline runs, outermost first:
//! request correlation and tracing, admin-key authentication, the host
//! information endpoints, and a fallback that dispatches to the service
//! mounted under the longest matching base path.

mod admin;
mod info;
mod mount;
mod server;
mod trace;

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use nuhost_config::HttpSettings;
use thiserror::Error;

use crate::model::ServiceHostDescription;
use crate::service::Service;

pub use admin::{ADMIN_ROLE, AdminPrincipal, INSECURE_TRANSPORT_MESSAGE};
pub use trace::{HttpTraceReporter, REQUEST_ID_HEADER, RequestId, StructuredHttpTraceReporter};

pub(crate) use server::HttpServer;

use admin::{AdminAuth, authenticate};
use mount::MountTable;
use trace::{Correlation, correlate};

pub(crate) const HTTP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");

/// Body of every 500 produced at the service boundary.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Errors raised while binding the shared listener.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A bind URL could not be parsed.
    #[error("invalid bind url '{url}': {source}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser diagnostic.
        #[source]
        source: url::ParseError,
    },
    /// A bind URL used a scheme other than `http`.
    #[error("unsupported scheme '{scheme}' in bind url '{url}'; terminate TLS in front of the host")]
    UnsupportedScheme {
        /// Offending URL.
        url: String,
        /// Scheme found.
        scheme: String,
    },
    /// The socket could not be bound.
    #[error("failed to bind '{url}': {source}")]
    Bind {
        /// URL being bound.
        url: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// An error a service handler returns to produce the generic 500 response.
///
/// The wrapped error is logged and never written to the response.
pub struct HttpServiceError(Box<dyn std::error::Error + Send + Sync>);

impl HttpServiceError {
    /// The wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl<E> From<E> for HttpServiceError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Box::new(error))
    }
}

impl fmt::Debug for HttpServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for HttpServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl IntoResponse for HttpServiceError {
    fn into_response(self) -> Response {
        tracing::error!(
            target: HTTP_TARGET,
            event = "http_exception",
            error = %self.0,
            "request handler failed"
        );
        unknown_error()
    }
}

/// The generic 500 response.
#[must_use]
pub fn unknown_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        UNKNOWN_ERROR_MESSAGE,
    )
        .into_response()
}

/// What the multiplexer needs to know about the host.
#[derive(Clone)]
pub struct HostView {
    description: ServiceHostDescription,
    instances: Arc<[Arc<dyn Service>]>,
}

impl HostView {
    /// Describes a host and its started instances.
    #[must_use]
    pub fn new(description: ServiceHostDescription, instances: Vec<Arc<dyn Service>>) -> Self {
        Self {
            description,
            instances: instances.into(),
        }
    }

    /// Host description.
    #[must_use]
    pub const fn description(&self) -> &ServiceHostDescription {
        &self.description
    }

    /// Started instances.
    #[must_use]
    pub fn instances(&self) -> &[Arc<dyn Service>] {
        &self.instances
    }
}

impl fmt::Debug for HostView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostView")
            .field("description", &self.description)
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct MultiplexState {
    pub(crate) host: HostView,
    pub(crate) mounts: Arc<MountTable>,
}

/// Builds the host-wide router.
#[must_use]
pub fn build_router(
    host: HostView,
    settings: &HttpSettings,
    trace: Arc<dyn HttpTraceReporter>,
) -> Router {
    let mounts = Arc::new(MountTable::new(host.instances()));
    let admin = Arc::new(AdminAuth::new(settings));
    let correlation = Correlation {
        trace,
        mounts: Arc::clone(&mounts),
    };
    let state = MultiplexState { host, mounts };

    Router::new()
        .route("/", get(info::discovery))
        .route("/_info", get(info::host_info))
        .route("/_info/instances", get(info::instances))
        .fallback(mount::dispatch)
        .with_state(state)
        .layer(middleware::from_fn_with_state(admin, authenticate))
        .layer(middleware::from_fn_with_state(correlation, correlate))
}

/// Whether the request arrived over TLS, either directly or via a
/// terminating proxy that sets `X-Forwarded-Proto`.
pub(crate) fn is_secure(headers: &HeaderMap, scheme: Option<&str>) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map_or_else(
            || scheme.is_some_and(|scheme| scheme.eq_ignore_ascii_case("https")),
            |proto| proto.trim().eq_ignore_ascii_case("https"),
        )
}

/// Host named by the request, without its port.
pub(crate) fn request_host(headers: &HeaderMap) -> &str {
    let authority = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    if authority.starts_with('[') {
        return authority
            .split_once(']')
            .map_or(authority, |(host, _)| host.trim_start_matches('['));
    }
    authority
        .split_once(':')
        .map_or(authority, |(host, _)| host)
}

/// Base URL the client used, e.g. `http://localhost:8080`.
pub(crate) fn request_base_url(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = if is_secure(headers, uri.scheme_str()) {
        "https"
    } else {
        "http"
    };
    let authority = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{authority}")
}
