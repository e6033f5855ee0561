use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use nuhost_platform::http::{ADMIN_ROLE, AdminPrincipal};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ECHO_TARGET, EMPTY_MESSAGE_REPLY};

const TEXT: [(header::HeaderName, &str); 1] = [(header::CONTENT_TYPE, "text/plain")];

#[derive(Debug, Deserialize)]
struct EchoQuery {
    message: Option<String>,
}

pub(crate) fn router() -> Router {
    Router::new()
        .route("/", get(operations))
        .route("/echo", get(echo))
        .route("/adminsOnly", get(admins_only))
        .route("/adminsGetExtra", get(admins_get_extra))
        .route("/throw", get(throw))
}

async fn operations() -> Json<Value> {
    Json(json!({ "operations": ["/adminsOnly", "/adminsGetExtra", "/echo"] }))
}

async fn echo(Query(query): Query<EchoQuery>) -> impl IntoResponse {
    let reply = match query.message.filter(|message| !message.is_empty()) {
        Some(message) => {
            tracing::info!(
                target: ECHO_TARGET,
                event = "echoing",
                text = %message,
                "Echoing '{message}'"
            );
            message
        }
        None => EMPTY_MESSAGE_REPLY.to_owned(),
    };
    (TEXT, reply)
}

// Rejecting the extractor yields 401, which the host turns into a challenge.
async fn admins_only(_admin: AdminPrincipal) -> impl IntoResponse {
    (TEXT, "Welcome, admin!")
}

async fn admins_get_extra(admin: Option<AdminPrincipal>) -> impl IntoResponse {
    let mut reply = String::from("Welcome!");
    if let Some(principal) = admin {
        reply.push_str(" You are logged in!");
        if principal.is_in_role(ADMIN_ROLE) {
            reply.push_str(" And you are an admin!");
        }
    }
    (TEXT, reply)
}

async fn throw() -> &'static str {
    panic!("Throw me a frickin' bone!")
}
