mod memory;
mod postgres;
pub mod validate;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Role;
use crate::error::AppError;

pub const DEFAULT_PHOTO: &str = "default.jpg";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_digest: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// True when the password changed after a token issued at `iat`
    /// (unix seconds), which makes that token stale.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.timestamp() > iat)
    }
}

/// `password_changed_at` recorded for a change made at `now`. Backdated by a
/// second so the token issued right after the change is not considered stale.
pub fn password_changed_stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(1)
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            photo: DEFAULT_PHOTO.to_string(),
            role: self.role,
            password_hash: self.password_hash,
            password_changed_at: None,
            password_reset_digest: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
        }
    }
}

/// Persistence for user documents. Every write touches only the columns it
/// names and is a single atomic update, so concurrent requests on the same
/// user never overwrite each other's fields. Finders and writes ignore
/// deactivated users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a validation error when the email is already taken.
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Only matches while the stored expiry is still after `now`.
    async fn find_by_reset_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    /// Changes the given profile fields and leaves the rest untouched.
    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, AppError>;

    /// Stores a new hash stamped with `password_changed_stamp(now)` and drops
    /// any pending reset.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError>;

    async fn set_reset(
        &self,
        id: Uuid,
        digest: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn clear_reset(&self, id: Uuid) -> Result<(), AppError>;

    async fn deactivate(&self, id: Uuid) -> Result<(), AppError>;

    async fn list(&self) -> Result<Vec<User>, AppError>;

    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

pub(crate) fn missing_user() -> AppError {
    AppError::NotFound("No document found with that ID".into())
}

pub(crate) fn duplicate_email(email: &str) -> AppError {
    AppError::Validation(format!(
        "Duplicate field value: {email}. Please use another value!"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        NewUser {
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
        .into_user(Utc::now())
    }

    #[test]
    fn serialized_user_has_no_secrets() {
        let mut user = user();
        user.password_reset_digest = Some("digest".into());
        user.password_reset_expires = Some(Utc::now());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["role"], "user");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password").is_none());
        assert!(json.get("passwordResetDigest").is_none());
        assert!(json.get("passwordResetExpires").is_none());
        assert!(json.get("active").is_none());
    }

    #[test]
    fn fresh_user_has_not_changed_password() {
        assert!(!user().changed_password_after(0));
    }

    #[test]
    fn token_before_change_is_stale_token_after_is_not() {
        let now = Utc::now();
        let mut user = user();
        user.password_changed_at = Some(password_changed_stamp(now));
        assert!(user.changed_password_after(now.timestamp() - 10));
        assert!(!user.changed_password_after(now.timestamp()));
    }
}
