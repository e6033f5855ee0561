//! Host information endpoints.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use serde::Serialize;
use time::OffsetDateTime;

use super::{AdminPrincipal, MultiplexState, request_base_url};
use crate::model::{BuildInfo, ServiceHostDescription};
use crate::service::ServiceStatus;

/// `GET /`: where the host and each HTTP service live, and what versions run.
#[derive(Debug, Serialize)]
pub(crate) struct Discovery {
    host: String,
    services: BTreeMap<String, String>,
    versions: BTreeMap<String, BuildInfo>,
}

/// `GET /_info`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HostInfo {
    #[serde(flatten)]
    description: ServiceHostDescription,
    platform: BuildInfo,
}

/// One row of `GET /_info/instances`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceInfo {
    name: String,
    service: String,
    #[serde(with = "time::serde::rfc3339::option")]
    last_heartbeat: Option<OffsetDateTime>,
    status: ServiceStatus,
}

pub(crate) async fn discovery(
    State(state): State<MultiplexState>,
    headers: HeaderMap,
    uri: Uri,
) -> Json<Discovery> {
    let base = request_base_url(&headers, &uri);
    let services = state
        .mounts
        .mounts()
        .map(|mount| {
            (
                mount.service().name().name().to_owned(),
                format!("{base}{}", mount.base_path()),
            )
        })
        .collect();
    let versions = state
        .host
        .instances()
        .iter()
        .map(|instance| (instance.name().name().to_owned(), instance.build_info()))
        .collect();
    Json(Discovery {
        host: format!("{base}/"),
        services,
        versions,
    })
}

pub(crate) async fn host_info(State(state): State<MultiplexState>) -> Json<HostInfo> {
    Json(HostInfo {
        description: state.host.description().clone(),
        platform: BuildInfo::platform(),
    })
}

pub(crate) async fn instances(
    _admin: AdminPrincipal,
    State(state): State<MultiplexState>,
) -> Json<Vec<InstanceInfo>> {
    Json(
        state
            .host
            .instances()
            .iter()
            .map(|instance| InstanceInfo {
                name: instance.name().to_string(),
                service: instance.name().name().to_owned(),
                last_heartbeat: instance.last_heartbeat(),
                status: instance.core().status(),
            })
            .collect(),
    )
}
