//! Admin-key HTTP Basic authentication.
//!
//! Active only when an admin key is configured. Credentials are accepted only
//! over a secure transport unless `Http.AllowInsecure` is set; a request that
//! tries to authenticate over plaintext, or that is challenged there, gets a
//! 403 explaining why instead of a bare 401.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nuhost_config::HttpSettings;

use super::{HTTP_TARGET, is_secure, request_host};

/// Role granted to callers presenting the admin key.
pub const ADMIN_ROLE: &str = "Admin";

/// Body of the rejection for authentication over plaintext.
pub const INSECURE_TRANSPORT_MESSAGE: &str = "cannot authenticate over insecure transport";

#[derive(Debug, Clone)]
pub(crate) struct AdminAuth {
    key: Option<String>,
    allow_insecure: bool,
}

impl AdminAuth {
    pub(crate) fn new(settings: &HttpSettings) -> Self {
        Self {
            key: settings.admin_key.clone(),
            allow_insecure: settings.allow_insecure,
        }
    }
}

/// An authenticated caller.
///
/// As an extractor it rejects unauthenticated requests with 401, which the
/// authentication layer turns into a challenge; `Option<AdminPrincipal>`
/// never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    user_name: String,
    role: &'static str,
}

impl AdminPrincipal {
    /// User name supplied with the credentials.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Granted role.
    #[must_use]
    pub const fn role(&self) -> &'static str {
        self.role
    }

    /// Whether the principal holds `role`.
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.role.eq_ignore_ascii_case(role)
    }
}

impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> OptionalFromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

pub(crate) async fn authenticate(
    State(auth): State<Arc<AdminAuth>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(key) = auth.key.as_deref() else {
        return next.run(request).await;
    };
    let transport_allowed =
        auth.allow_insecure || is_secure(request.headers(), request.uri().scheme_str());
    let realm = request_host(request.headers()).to_owned();

    if let Some(credentials) = request.headers().get(header::AUTHORIZATION) {
        if !transport_allowed {
            tracing::warn!(
                target: HTTP_TARGET,
                event = "insecure_authentication",
                "rejected credentials sent over plaintext"
            );
            return insecure_transport();
        }
        if let Some(principal) = verify_basic(credentials, key) {
            request.extensions_mut().insert(principal);
        }
    }

    let mut response = next.run(request).await;
    if response.status() != StatusCode::UNAUTHORIZED {
        return response;
    }
    if !transport_allowed {
        return insecure_transport();
    }
    if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge);
    }
    response
}

// Plain equality on the password, not a constant-time compare.
fn verify_basic(header: &HeaderValue, key: &str) -> Option<AdminPrincipal> {
    let value = header.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user_name, password) = text.split_once(':')?;
    (password == key).then(|| AdminPrincipal {
        user_name: user_name.to_owned(),
        role: ADMIN_ROLE,
    })
}

fn insecure_transport() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain")],
        INSECURE_TRANSPORT_MESSAGE,
    )
        .into_response()
}
