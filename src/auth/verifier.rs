use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::{
    auth::services::normalize_email,
    error::AuthError,
    users::{
        model::{hash_password, verify_password},
        UserIdentity, UserStore,
    },
};

lazy_static! {
    // Compared against when the email is unknown so both failure paths hash once.
    static ref DUMMY_HASH: String = hash_password("reelauth-dummy-password").unwrap_or_default();
}

/// Checks submitted credentials and yields the identity to put in the session.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn authorize(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError>;
}

/// Email + password check against the user store.
pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CredentialsProvider for CredentialVerifier {
    async fn authorize(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::bad_input("Missing Email or Password"));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|e| AuthError::internal("failed to sign in", e))?;

        let Some(user) = user else {
            let _ = verify_password(password, &DUMMY_HASH);
            warn!(email = %email, "sign in rejected: no user found");
            return Err(AuthError::InvalidCredentials);
        };

        let ok = verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::internal("failed to sign in", e))?;
        if !ok {
            warn!(email = %email, user_id = %user.id, "sign in rejected: invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        debug!(user_id = %user.id, "credentials accepted");
        Ok(UserIdentity::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::MemoryUserStore;

    async fn verifier_with(email: &str, password: &str) -> CredentialVerifier {
        let store = Arc::new(MemoryUserStore::default());
        store.create(email, password).await.expect("seed user");
        CredentialVerifier::new(store)
    }

    #[tokio::test]
    async fn correct_password_yields_identity() {
        let verifier = verifier_with("a@x.com", "secret123").await;
        let who = verifier.authorize("a@x.com", "secret123").await.expect("authorize");
        assert_eq!(who.email, "a@x.com");
    }

    #[tokio::test]
    async fn email_lookup_is_normalized() {
        let verifier = verifier_with("a@x.com", "secret123").await;
        let who = verifier.authorize("  A@X.com ", "secret123").await.expect("authorize");
        assert_eq!(who.email, "a@x.com");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let verifier = verifier_with("a@x.com", "secret123").await;

        let wrong = verifier.authorize("a@x.com", "wrong").await.unwrap_err();
        let unknown = verifier.authorize("nobody@x.com", "secret123").await.unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn empty_fields_are_bad_input() {
        let verifier = verifier_with("a@x.com", "secret123").await;
        let err = verifier.authorize("", "secret123").await.unwrap_err();
        assert!(matches!(err, AuthError::BadInput(_)));
        let err = verifier.authorize("a@x.com", "").await.unwrap_err();
        assert!(matches!(err, AuthError::BadInput(_)));
    }
}
