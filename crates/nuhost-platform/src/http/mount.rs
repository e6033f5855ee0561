//! Dispatch to service routers by longest matching base path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use tower::ServiceExt;
use tracing::Instrument;

use super::{HTTP_TARGET, MultiplexState, unknown_error};
use crate::service::Service;

pub(crate) struct Mount {
    base_path: String,
    service: Arc<dyn Service>,
    router: Router,
}

impl Mount {
    pub(crate) fn base_path(&self) -> &str {
        &self.base_path
    }

    pub(crate) fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }
}

/// HTTP-capable services ordered so the longest base path is tried first.
pub(crate) struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub(crate) fn new(instances: &[Arc<dyn Service>]) -> Self {
        let mut mounts: Vec<Mount> = instances
            .iter()
            .filter_map(|service| {
                service.http().map(|surface| Mount {
                    base_path: surface.base_path().to_owned(),
                    router: surface.router().clone(),
                    service: Arc::clone(service),
                })
            })
            .collect();
        mounts.sort_by(|left, right| right.base_path.len().cmp(&left.base_path.len()));
        Self { mounts }
    }

    pub(crate) fn mounts(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }

    /// Finds the mount for `path` and the path relative to it.
    pub(crate) fn resolve(&self, path: &str) -> Option<(&Mount, String)> {
        self.mounts
            .iter()
            .find_map(|mount| strip_base(path, &mount.base_path).map(|rest| (mount, rest)))
    }
}

/// Strips `base` from `path`, ignoring ASCII case and respecting segment
/// boundaries: `/echo` matches `/echo` and `/echo/x` but not `/echoes`.
fn strip_base(path: &str, base: &str) -> Option<String> {
    if base.is_empty() || base == "/" {
        return Some(path.to_owned());
    }
    let head = path.get(..base.len())?;
    if !head.eq_ignore_ascii_case(base) {
        return None;
    }
    match path.get(base.len()..)? {
        "" => Some("/".to_owned()),
        rest if rest.starts_with('/') => Some(rest.to_owned()),
        _ => None,
    }
}

/// Fallback handler: runs the target service's router inside a `service`
/// span, converting panics into the generic 500.
pub(crate) async fn dispatch(State(state): State<MultiplexState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let Some((mount, rest)) = state.mounts.resolve(parts.uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let url = parts.uri.to_string();
    let target = match parts.uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest,
    };
    parts.uri = match target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let span = tracing::info_span!("service", service = %mount.service.name());
    let call = mount
        .router
        .clone()
        .oneshot(Request::from_parts(parts, body));
    match AssertUnwindSafe(call).catch_unwind().instrument(span).await {
        Ok(Ok(response)) => response,
        Ok(Err(never)) => match never {},
        Err(panic) => {
            tracing::error!(
                target: HTTP_TARGET,
                event = "http_exception",
                service = %mount.service.name(),
                url = %url,
                error = %panic_message(panic.as_ref()),
                "unhandled error while handling request"
            );
            unknown_error()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic")
}
