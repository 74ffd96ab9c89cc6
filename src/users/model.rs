use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never the plaintext
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Minimal identity handed out after a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
}

impl From<&User> for UserIdentity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

/// A user that has not been stored yet. Building one hashes the password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(email: &str, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
        })
    }
}

/// Argon2id PHC string for `plain` under a freshly generated salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("hash password: {e}")
        })
}

/// `Ok(false)` on a mismatch; `Err` only when `stored` is not a usable PHC string.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is unreadable");
        anyhow::anyhow!("parse stored hash: {e}")
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("verify password: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(password: &str) -> NewUser {
        NewUser::new("a@x.com", password).expect("hash")
    }

    #[test]
    fn new_user_never_keeps_plaintext() {
        let user = new_user("secret123");
        assert_ne!(user.password_hash, "secret123");
        assert!(!user.password_hash.contains("secret123"));
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(verify_password("secret123", &user.password_hash).expect("verify"));
    }

    #[test]
    fn two_users_same_password_differ() {
        let a = new_user("correct-horse");
        let b = new_user("correct-horse");
        assert_ne!(a.id, b.id);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn new_user_rejects_other_passwords() {
        let user = new_user("secret123");
        assert!(!verify_password("secret124", &user.password_hash).expect("mismatch is not an error"));
        assert!(!verify_password("", &user.password_hash).expect("mismatch is not an error"));
    }

    #[test]
    fn unreadable_stored_hash_is_an_error() {
        let err = verify_password("secret123", "plaintext-left-in-db").unwrap_err();
        assert!(err.to_string().starts_with("parse stored hash"));
    }

    #[test]
    fn serialized_user_hides_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: new_user("secret123").password_hash,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("argon2"));
    }
}
