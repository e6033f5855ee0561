//! The shared HTTP pipeline, exercised in-process through the host router.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rstest::rstest;
use serde_json::Value;
use time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use super::support::{HostFixture, VALID_AT, at, settings};
use crate::http::{
    AdminPrincipal, HttpServiceError, INSECURE_TRANSPORT_MESSAGE, REQUEST_ID_HEADER,
    UNKNOWN_ERROR_MESSAGE,
};
use crate::service::ServiceDefinition;
use crate::testing::{Script, ScriptedService, TraceEvent};

const HOST: &str = "example.test:8080";
const ADMIN_KEY: &str = "s3cret";

fn echo() -> Router {
    Router::new()
        .route("/", get(|| async { "echo root" }))
        .route("/echo", get(|| async { "echoed" }))
        .route("/throw", get(explode))
        .route(
            "/fail",
            get(|| async {
                Err::<String, HttpServiceError>(
                    std::io::Error::other("database unavailable").into(),
                )
            }),
        )
        .route(
            "/admin",
            get(|admin: AdminPrincipal| async move { format!("hello {}", admin.user_name()) }),
        )
        .route(
            "/maybe",
            get(|admin: Option<AdminPrincipal>| async move {
                if admin.is_some() { "admin" } else { "anonymous" }
            }),
        )
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

fn api(label: &'static str) -> Router {
    Router::new().route("/{*rest}", get(move || async move { label }))
}

fn definitions() -> Vec<ServiceDefinition> {
    vec![
        ScriptedService::definition("Echo", Script::http(echo())),
        ScriptedService::definition(
            "Api",
            Script {
                base_path: Some("/api".to_owned()),
                ..Script::http(api("api"))
            },
        ),
        ScriptedService::definition(
            "ApiV2",
            Script {
                base_path: Some("api/v2/".to_owned()),
                ..Script::http(api("api-v2"))
            },
        ),
        ScriptedService::definition("Quiet", Script::default()),
    ]
}

async fn started(pairs: &[(&str, &str)]) -> (HostFixture, Router) {
    let fixture = HostFixture::new(definitions(), settings(pairs));
    assert!(fixture.start().await);
    let router = fixture.host.http_router().expect("router built");
    (fixture, router)
}

fn get_request(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, HOST)
}

async fn send(router: &Router, request: axum::http::request::Builder) -> Response {
    router
        .clone()
        .oneshot(request.body(Body::empty()).expect("valid request"))
        .await
        .expect("infallible")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn basic(credentials: &str) -> String {
    format!("Basic {}", STANDARD.encode(credentials))
}

#[tokio::test]
async fn dispatches_to_the_mounted_service() {
    let (_fixture, router) = started(&[]).await;
    let response = send(&router, get_request("/echo/echo")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "echoed");

    let root = send(&router, get_request("/echo")).await;
    assert_eq!(body_text(root).await, "echo root");
}

#[rstest]
#[case("/ECHO/echo", "echoed")]
#[case("/api/thing", "api")]
#[case("/api/v2/thing", "api-v2")]
#[case("/API/V2/thing", "api-v2")]
#[case("/api/v2x/thing", "api")]
#[tokio::test]
async fn longest_base_path_wins_ignoring_case(#[case] uri: &str, #[case] expected: &str) {
    let (_fixture, router) = started(&[]).await;
    let response = send(&router, get_request(uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, expected);
}

#[tokio::test]
async fn unmatched_paths_are_not_found() {
    let (_fixture, router) = started(&[]).await;
    assert_eq!(
        send(&router, get_request("/nowhere")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(&router, get_request("/echoes")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn reuses_the_inbound_request_id() {
    let (fixture, router) = started(&[]).await;
    send(
        &router,
        get_request("/echo/echo?x=1").header(REQUEST_ID_HEADER, "r1"),
    )
    .await;

    let events = fixture.trace.events();
    assert_eq!(
        events,
        vec![
            TraceEvent::Begin {
                method: "GET".to_owned(),
                url: "http://example.test:8080/echo/echo?x=1".to_owned(),
                request_id: "r1".to_owned(),
            },
            TraceEvent::End {
                status: 200,
                url: "http://example.test:8080/echo/echo?x=1".to_owned(),
                content_length: 6,
                request_id: "r1".to_owned(),
            },
        ]
    );
}

#[tokio::test]
async fn generates_a_request_id_when_none_is_supplied() {
    let (fixture, router) = started(&[]).await;
    send(&router, get_request("/echo/echo")).await;

    let events = fixture.trace.events();
    assert_eq!(events.len(), 2);
    let begin = events[0].request_id();
    assert!(Uuid::parse_str(begin).is_ok(), "not a uuid: {begin}");
    assert_eq!(begin, events[1].request_id());
}

#[tokio::test]
async fn panics_become_generic_errors_and_the_router_survives() {
    let (fixture, router) = started(&[]).await;
    let response = send(&router, get_request("/echo/throw")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, UNKNOWN_ERROR_MESSAGE);
    assert!(fixture.trace.events().iter().any(|event| matches!(
        event,
        TraceEvent::End { status: 500, .. }
    )));

    let after = send(&router, get_request("/echo/echo")).await;
    assert_eq!(after.status(), StatusCode::OK);
}

#[tokio::test]
async fn handler_errors_hide_their_details() {
    let (_fixture, router) = started(&[]).await;
    let response = send(&router, get_request("/echo/fail")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert_eq!(body, UNKNOWN_ERROR_MESSAGE);
    assert!(!body.contains("database"));
}

#[tokio::test]
async fn requests_heartbeat_the_target_service() {
    let (fixture, router) = started(&[]).await;
    let later = at(VALID_AT) + Duration::minutes(5);
    fixture.clock.set(later);

    send(&router, get_request("/echo/echo")).await;
    let echo = fixture.host.get_instance("Echo").expect("registered");
    let api = fixture.host.get_instance("Api").expect("registered");
    assert_eq!(echo.last_heartbeat(), Some(later));
    assert_eq!(api.last_heartbeat(), Some(at(VALID_AT)));
}

#[tokio::test]
async fn refused_credentials_still_heartbeat_the_target_service() {
    let (fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let later = at(VALID_AT) + Duration::minutes(5);
    fixture.clock.set(later);

    let response = send(
        &router,
        get_request("/echo/maybe")
            .header(header::AUTHORIZATION, basic(&format!("ops:{ADMIN_KEY}"))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let echo = fixture.host.get_instance("Echo").expect("registered");
    assert_eq!(echo.last_heartbeat(), Some(later));
}

#[tokio::test]
async fn discovery_document_lists_http_services() {
    let (_fixture, router) = started(&[]).await;
    let response = send(&router, get_request("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let document: Value =
        serde_json::from_str(&body_text(response).await).expect("json document");

    assert_eq!(document["host"], "http://example.test:8080/");
    assert_eq!(document["services"]["Echo"], "http://example.test:8080/echo");
    assert_eq!(document["services"]["ApiV2"], "http://example.test:8080/api/v2");
    assert!(document["services"].get("Quiet").is_none());
    assert_eq!(
        document["versions"]["Quiet"]["version"],
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::test]
async fn discovery_reports_https_behind_a_proxy() {
    let (_fixture, router) = started(&[]).await;
    let response = send(
        &router,
        get_request("/").header("x-forwarded-proto", "https"),
    )
    .await;
    let document: Value =
        serde_json::from_str(&body_text(response).await).expect("json document");
    assert_eq!(document["host"], "https://example.test:8080/");
}

#[tokio::test]
async fn host_info_describes_the_instance() {
    let (_fixture, router) = started(&[]).await;
    let response = send(&router, get_request("/_info")).await;
    let document: Value =
        serde_json::from_str(&body_text(response).await).expect("json document");
    assert_eq!(document["instanceName"], "nuget-local-0-test_IN0");
    assert_eq!(document["machineName"], "test-machine");
}

#[tokio::test]
async fn instance_listing_requires_the_admin_key() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let anonymous = send(
        &router,
        get_request("/_info/instances").header("x-forwarded-proto", "https"),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let admin = send(
        &router,
        get_request("/_info/instances")
            .header("x-forwarded-proto", "https")
            .header(header::AUTHORIZATION, basic(&format!("ops:{ADMIN_KEY}"))),
    )
    .await;
    assert_eq!(admin.status(), StatusCode::OK);
    let rows: Value = serde_json::from_str(&body_text(admin).await).expect("json rows");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["service"], "Echo");
    assert_eq!(rows[0]["status"], "started");
}

#[tokio::test]
async fn challenges_over_plaintext_are_forbidden() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let response = send(&router, get_request("/echo/admin")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, INSECURE_TRANSPORT_MESSAGE);
}

#[tokio::test]
async fn challenges_over_https_ask_for_basic_credentials() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let response = send(
        &router,
        get_request("/echo/admin").header("x-forwarded-proto", "https"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"example.test\""
    );
}

#[tokio::test]
async fn valid_credentials_over_https_grant_the_admin_role() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let response = send(
        &router,
        get_request("/echo/admin")
            .header("x-forwarded-proto", "https")
            .header(header::AUTHORIZATION, basic(&format!("ops:{ADMIN_KEY}"))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello ops");
}

#[tokio::test]
async fn credentials_over_plaintext_are_forbidden() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let response = send(
        &router,
        get_request("/echo/maybe")
            .header(header::AUTHORIZATION, basic(&format!("ops:{ADMIN_KEY}"))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn insecure_transport_can_be_allowed() {
    let (_fixture, router) = started(&[
        ("Http.AdminKey", ADMIN_KEY),
        ("Http.AllowInsecure", "true"),
    ])
    .await;
    let response = send(
        &router,
        get_request("/echo/admin")
            .header(header::AUTHORIZATION, basic(&format!("ops:{ADMIN_KEY}"))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let challenged = send(&router, get_request("/echo/admin")).await;
    assert_eq!(challenged.status(), StatusCode::UNAUTHORIZED);
    assert!(challenged.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn wrong_passwords_are_challenged() {
    let (_fixture, router) = started(&[("Http.AdminKey", ADMIN_KEY)]).await;
    let response = send(
        &router,
        get_request("/echo/admin")
            .header("x-forwarded-proto", "https")
            .header(header::AUTHORIZATION, basic("ops:guess")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let optional = send(
        &router,
        get_request("/echo/maybe")
            .header("x-forwarded-proto", "https")
            .header(header::AUTHORIZATION, basic("ops:guess")),
    )
    .await;
    assert_eq!(body_text(optional).await, "anonymous");
}

#[tokio::test]
async fn without_an_admin_key_nobody_is_admin() {
    let (_fixture, router) = started(&[]).await;
    let response = send(
        &router,
        get_request("/echo/admin")
            .header("x-forwarded-proto", "https")
            .header(header::AUTHORIZATION, basic("ops:anything")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
}
