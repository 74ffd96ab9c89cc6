use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use super::{claims::SessionClaims, session::SessionKeys};
use crate::state::AppState;

const PUBLIC_PREFIXES: &[&str] = &["/login", "/register", "/api/auth", "/api/videos"];

/// Paths the gate never looks at.
const UNGATED_PREFIXES: &[&str] = &["/static/", "/assets/", "/favicon.ico"];

pub const LOGIN_PATH: &str = "/login";

/// Whether a request for `path` may proceed given the decoded session, if any.
pub fn is_authorized(path: &str, session: Option<&SessionClaims>) -> bool {
    if path == "/" || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    session.is_some()
}

fn is_gated(path: &str) -> bool {
    !UNGATED_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn login_redirect(original: &str) -> String {
    format!("{LOGIN_PATH}?callbackUrl={}", urlencoding::encode(original))
}

/// Runs before every handler: lets public and signed-in requests through and
/// sends everything else to the login page.
pub async fn route_gate(
    State(state): State<AppState>,
    cookies: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !is_gated(&path) {
        return next.run(request).await;
    }

    let keys = SessionKeys::from_ref(&state);
    let claims = keys.claims_from_request(&cookies, request.headers());

    if !is_authorized(&path, claims.as_ref()) {
        let original = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path.as_str());
        debug!(path = %path, "unauthenticated request redirected to login");
        return Redirect::temporary(&login_redirect(original)).into_response();
    }

    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }
    next.run(request).await
}
