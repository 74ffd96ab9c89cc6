use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;

use super::{claims::SessionClaims, session::SessionKeys};
use crate::error::AuthError;

/// The signed-in caller. Uses the claims left by the route gate, or decodes the
/// request's token when the route is not gated.
pub struct AuthUser(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<SessionClaims>() {
            return Ok(AuthUser(claims.clone()));
        }

        let keys = SessionKeys::from_ref(state);
        let cookies = CookieJar::from_headers(&parts.headers);
        keys.claims_from_request(&cookies, &parts.headers)
            .map(AuthUser)
            .ok_or(AuthError::Unauthenticated)
    }
}
