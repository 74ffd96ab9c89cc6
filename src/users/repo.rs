use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::db::{ConnectError, PgCache};
use crate::users::model::{hash_password, NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hash(anyhow::Error),
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Inserts an already-hashed user; fails with `DuplicateEmail` on a taken email.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Replaces the stored hash and bumps `updated_at`.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError>;

    /// Creates a user from a plaintext password.
    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let new_user = NewUser::new(email, password).map_err(StoreError::Hash)?;
        self.insert(new_user).await
    }

    /// Re-hashes `password` with a fresh salt and stores it.
    async fn update_password(&self, id: Uuid, password: &str) -> Result<User, StoreError> {
        let hash = hash_password(password).map_err(StoreError::Hash)?;
        self.set_password_hash(id, &hash).await
    }
}

/// `UserStore` over the `users` table.
pub struct PgUserStore {
    db: Arc<PgCache>,
}

impl PgUserStore {
    pub fn new(db: Arc<PgCache>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let pool = self.db.acquire().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let pool = self.db.acquire().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let pool = self.db.acquire().await?;
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StoreError::DuplicateEmail;
                }
            }
            StoreError::Database(e)
        })?;
        debug!(user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        let pool = self.db.acquire().await?;
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(updated)
    }
}
