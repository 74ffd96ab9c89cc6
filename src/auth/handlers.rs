use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, CredentialsRequest, MessageResponse, RegisterRequest,
            SessionResponse, SignInResponse,
        },
        extractors::AuthUser,
        services::register_user,
        session::SessionKeys,
    },
    error::AuthError,
    state::AppState,
    users::UserIdentity,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/callback/credentials", post(sign_in))
        .route("/api/auth/session", get(session))
        .route("/api/auth/signout", post(sign_out))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/account/password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "unreadable register body");
        AuthError::bad_input("Email and Password are required")
    })?;

    register_user(
        state.users.as_ref(),
        payload.email.as_deref(),
        payload.password.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SignInResponse>), AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "unreadable sign-in body");
        AuthError::bad_input("Missing Email or Password")
    })?;

    let identity = state
        .credentials
        .authorize(
            payload.email.as_deref().unwrap_or_default(),
            payload.password.as_deref().unwrap_or_default(),
        )
        .await?;

    let keys = SessionKeys::from_ref(&state);
    let issued = keys
        .issue(&identity)
        .map_err(|e| AuthError::internal("failed to sign in", e))?;

    info!(user_id = %identity.id, email = %identity.email, "user signed in");
    Ok((
        jar.add(keys.session_cookie(&issued)),
        Json(SignInResponse {
            token: issued.token,
            user: identity,
            expires: issued.expires,
        }),
    ))
}

/// Current session, or `{}` when there is none. Re-issues the cookie once the
/// token is older than the update age.
#[instrument(skip_all)]
pub async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
) -> Response {
    let Some(AuthUser(claims)) = user else {
        return Json(json!({})).into_response();
    };

    let keys = SessionKeys::from_ref(&state);
    if keys.needs_renewal(&claims) {
        match keys.issue(&claims.identity()) {
            Ok(renewed) => {
                debug!(user_id = %claims.sub, "session renewed");
                let body = SessionResponse {
                    user: renewed.claims.identity(),
                    expires: renewed.expires,
                };
                return (jar.add(keys.session_cookie(&renewed)), Json(body)).into_response();
            }
            Err(e) => warn!(error = %e, "session renewal failed"),
        }
    }

    let expires = OffsetDateTime::from_unix_timestamp(claims.exp as i64)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    Json(SessionResponse {
        user: claims.identity(),
        expires,
    })
    .into_response()
}

#[instrument(skip_all)]
pub async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let keys = SessionKeys::from_ref(&state);
    (
        jar.remove(keys.removal_cookie()),
        Json(MessageResponse::new("Signed out")),
    )
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserIdentity>, AuthError> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await
        .map_err(|e| AuthError::internal("failed to load user", e))?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "session for a deleted user");
            AuthError::Unauthenticated
        })?;

    Ok(Json(UserIdentity::from(&user)))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.sub))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Json(payload) = payload
        .map_err(|_| AuthError::bad_input("Current and new password are required"))?;
    let current = payload.current_password.unwrap_or_default();
    let new = payload.new_password.unwrap_or_default();
    if current.is_empty() || new.is_empty() {
        return Err(AuthError::bad_input("Current and new password are required"));
    }

    state.credentials.authorize(&claims.email, &current).await?;

    state
        .users
        .update_password(claims.sub, &new)
        .await
        .map_err(|e| AuthError::internal("failed to update password", e))?;

    info!(user_id = %claims.sub, "password changed");
    Ok(Json(MessageResponse::new("Password updated")))
}
