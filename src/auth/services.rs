use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    error::AuthError,
    users::{StoreError, User, UserStore},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates an account. Hashing happens inside `UserStore::create`.
pub async fn register_user(
    users: &dyn UserStore,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<User, AuthError> {
    let email = email.map(normalize_email).unwrap_or_default();
    let password = password.unwrap_or_default();

    // The password is stored as typed; only a blank one counts as missing.
    if email.is_empty() || password.trim().is_empty() {
        warn!("register rejected: missing fields");
        return Err(AuthError::bad_input("Email and Password are required"));
    }

    if !is_valid_email(&email) {
        warn!(email = %email, "register rejected: invalid email");
        return Err(AuthError::bad_input("Invalid email"));
    }

    let existing = users
        .find_by_email(&email)
        .await
        .map_err(|e| AuthError::internal("failed to register user", e))?;
    if existing.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::Conflict);
    }

    let user = match users.create(&email, password).await {
        Ok(u) => u,
        Err(StoreError::DuplicateEmail) => {
            warn!(email = %email, "email registered concurrently");
            return Err(AuthError::Conflict);
        }
        Err(e) => return Err(AuthError::internal("failed to register user", e)),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}
