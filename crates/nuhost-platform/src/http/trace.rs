//! Request correlation and begin/end request tracing.

use std::sync::Arc;

use axum::body::HttpBody;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::mount::MountTable;
use super::{HTTP_TARGET, is_secure};

/// Inbound header whose value is reused as the request ID.
pub const REQUEST_ID_HEADER: &str = "x-arr-log-id";

/// Correlation ID attached to every request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// The identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Observer for request boundaries.
pub trait HttpTraceReporter: Send + Sync {
    /// A request arrived.
    fn begin_request(
        &self,
        method: &str,
        url: &str,
        referrer: &str,
        user_agent: &str,
        request_id: &str,
    );

    /// A response is about to be written.
    fn end_request(&self, status: u16, url: &str, content_length: u64, request_id: &str);
}

impl<T> HttpTraceReporter for Arc<T>
where
    T: HttpTraceReporter + ?Sized,
{
    fn begin_request(
        &self,
        method: &str,
        url: &str,
        referrer: &str,
        user_agent: &str,
        request_id: &str,
    ) {
        (**self).begin_request(method, url, referrer, user_agent, request_id);
    }

    fn end_request(&self, status: u16, url: &str, content_length: u64, request_id: &str) {
        (**self).end_request(status, url, content_length, request_id);
    }
}

/// Default reporter that records request boundaries using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHttpTraceReporter;

impl HttpTraceReporter for StructuredHttpTraceReporter {
    fn begin_request(
        &self,
        method: &str,
        url: &str,
        referrer: &str,
        user_agent: &str,
        request_id: &str,
    ) {
        tracing::info!(
            target: HTTP_TARGET,
            event = "begin_request",
            method,
            url,
            referrer,
            user_agent,
            request_id,
            "{method} {url}"
        );
    }

    fn end_request(&self, status: u16, url: &str, content_length: u64, request_id: &str) {
        tracing::info!(
            target: HTTP_TARGET,
            event = "end_request",
            status,
            url,
            content_length,
            request_id,
            "{status} {url}"
        );
    }
}

/// What the correlation stage needs: where to report and which service a
/// path belongs to.
#[derive(Clone)]
pub(crate) struct Correlation {
    pub(crate) trace: Arc<dyn HttpTraceReporter>,
    pub(crate) mounts: Arc<MountTable>,
}

/// Assigns the request ID, heartbeats the target service and reports the
/// request's begin and end.
///
/// The end event fires for every response, including the 500s produced for
/// failed handlers and the admin gate's refusals further down the pipeline.
pub(crate) async fn correlate(
    State(Correlation { trace, mounts }): State<Correlation>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some((mount, _)) = mounts.resolve(request.uri().path()) {
        mount.service().heartbeat();
    }
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
    let url = absolute_url(&request);
    trace.begin_request(
        request.method().as_str(),
        &url,
        header_text(request.headers(), header::REFERER),
        header_text(request.headers(), header::USER_AGENT),
        &request_id,
    );

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));
    let response = next.run(request).await;

    trace.end_request(
        response.status().as_u16(),
        &url,
        content_length(&response),
        &request_id,
    );
    response
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn absolute_url(request: &Request) -> String {
    let scheme = if is_secure(request.headers(), request.uri().scheme_str()) {
        "https"
    } else {
        "http"
    };
    let authority = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let path = request
        .uri()
        .path_and_query()
        .map_or("/", |path| path.as_str());
    format!("{scheme}://{authority}{path}")
}

fn content_length(response: &Response) -> u64 {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .or_else(|| response.body().size_hint().exact())
        .unwrap_or(0)
}
