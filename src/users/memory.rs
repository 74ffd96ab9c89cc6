use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{NewUser, User};
use crate::users::repo::{StoreError, UserStore};

/// In-process `UserStore` used by tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::verify_password;

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::default();
        store.create("a@x.com", "secret123").await.expect("first insert");
        let err = store.create("a@x.com", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_password_rehashes_and_touches_timestamp() {
        let store = MemoryUserStore::default();
        let user = store.create("a@x.com", "secret123").await.expect("insert");
        let updated = store.update_password(user.id, "n3w-secret").await.expect("update");
        assert_ne!(updated.password_hash, user.password_hash);
        assert!(verify_password("n3w-secret", &updated.password_hash).unwrap());
        assert!(updated.updated_at >= user.updated_at);
        assert_eq!(updated.created_at, user.created_at);
    }

    #[tokio::test]
    async fn update_password_on_missing_user() {
        let store = MemoryUserStore::default();
        let err = store.update_password(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
