use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::UserIdentity;

/// Request body for user registration. Missing fields are reported as bad input,
/// so both are optional here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for the credentials sign-in callback.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returned after a successful sign-in.
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub user: UserIdentity,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

/// Shape of `GET /api/auth/session` for a live session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserIdentity,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}
