use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{duplicate_email, missing_user, password_changed_stamp, NewUser, User, UserStore};
use crate::error::AppError;

/// Process-local store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn active_mut(users: &mut HashMap<Uuid, User>, id: Uuid) -> Result<&mut User, AppError> {
    users
        .get_mut(&id)
        .filter(|u| u.active)
        .ok_or_else(missing_user)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(duplicate_email(&user.email));
        }
        let user = user.into_user(Utc::now());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(|u| u.active).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.active && u.email == email)
            .cloned())
    }

    async fn find_by_reset_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.active
                    && u.password_reset_digest.as_deref() == Some(digest)
                    && u.password_reset_expires.is_some_and(|expires| expires > now)
            })
            .cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if let Some(email) = email {
            if users.values().any(|u| u.id != id && u.email == email) {
                return Err(duplicate_email(email));
            }
        }
        let user = active_mut(&mut users, id)?;
        if let Some(name) = name {
            user.name = name.to_string();
        }
        if let Some(email) = email {
            user.email = email.to_string();
        }
        Ok(user.clone())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        user.password_hash = password_hash.to_string();
        user.password_changed_at = Some(password_changed_stamp(now));
        user.password_reset_digest = None;
        user.password_reset_expires = None;
        Ok(user.clone())
    }

    async fn set_reset(
        &self,
        id: Uuid,
        digest: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        user.password_reset_digest = Some(digest.to_string());
        user.password_reset_expires = Some(expires);
        Ok(())
    }

    async fn clear_reset(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = active_mut(&mut users, id)?;
        user.password_reset_digest = None;
        user.password_reset_expires = None;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        active_mut(&mut users, id)?.active = false;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().filter(|u| u.active).cloned().collect();
        all.sort_by_key(|u| u.created_at);
        Ok(all)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();
        let err = store.insert(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("a@x.com")));
    }

    #[tokio::test]
    async fn profile_update_rejects_another_users_email() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();
        let b = store.insert(new_user("b@x.com")).await.unwrap();
        let err = store
            .update_profile(b.id, None, Some("a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn profile_update_leaves_credentials_alone() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store.set_password(user.id, "new-hash", now).await.unwrap();

        let updated = store
            .update_profile(user.id, Some("Renamed"), None)
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email, "a@x.com");
        assert_eq!(updated.password_hash, "new-hash");
        assert_eq!(
            updated.password_changed_at,
            Some(password_changed_stamp(now))
        );
    }

    #[tokio::test]
    async fn reset_digest_lookup_respects_expiry() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .set_reset(user.id, "digest", now + Duration::minutes(10))
            .await
            .unwrap();

        let found = store.find_by_reset_digest("digest", now).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(store
            .find_by_reset_digest("digest", now + Duration::minutes(11))
            .await
            .unwrap()
            .is_none());
        assert!(store.find_by_reset_digest("other", now).await.unwrap().is_none());

        store.clear_reset(user.id).await.unwrap();
        assert!(store.find_by_reset_digest("digest", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_password_drops_pending_reset() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .set_reset(user.id, "digest", now + Duration::minutes(10))
            .await
            .unwrap();

        let updated = store.set_password(user.id, "new-hash", now).await.unwrap();
        assert!(updated.password_reset_digest.is_none());
        assert!(updated.password_reset_expires.is_none());
        assert!(store.find_by_reset_digest("digest", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivated_users_are_hidden() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        store.deactivate(user.id).await.unwrap();

        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            store.deactivate(user.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        assert!(store.delete(user.id).await.unwrap());
        assert!(!store.delete(user.id).await.unwrap());
    }
}
