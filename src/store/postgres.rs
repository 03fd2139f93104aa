use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::PgPool;
use uuid::Uuid;

use super::{duplicate_email, missing_user, password_changed_stamp, NewUser, User, UserStore};
use crate::auth::Role;
use crate::error::AppError;

const USER_COLUMNS: &str = "id, name, email, photo, role, password_hash, password_changed_at, \
     password_reset_digest, password_reset_expires, active, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    photo: String,
    role: String,
    password_hash: String,
    password_changed_at: Option<DateTime<Utc>>,
    password_reset_digest: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| AppError::Internal(format!("user {}: {e}", row.id)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            photo: row.photo,
            role,
            password_hash: row.password_hash,
            password_changed_at: row.password_changed_at,
            password_reset_digest: row.password_reset_digest,
            password_reset_expires: row.password_reset_expires,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

fn map_write_error(e: sqlx::Error, email: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => duplicate_email(email),
        other => AppError::Sqlx(other),
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn one_row(result: &PgQueryResult) -> Result<(), AppError> {
    if result.rows_affected() == 0 {
        return Err(missing_user());
    }
    Ok(())
}

fn select_active(clause: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE active AND {clause}")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let user = user.into_user(Utc::now());
        sqlx::query(
            "INSERT INTO users (id, name, email, photo, role, password_hash, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.photo)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &user.email))?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&select_active("id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&select_active("email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_reset_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let sql = select_active("password_reset_digest = $1 AND password_reset_expires > $2");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(digest)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email), \
             updated_at = now() WHERE id = $1 AND active RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(name)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, email.unwrap_or_default()))?
            .map(User::try_from)
            .transpose()?
            .ok_or_else(missing_user)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, \
             password_reset_digest = NULL, password_reset_expires = NULL, updated_at = now() \
             WHERE id = $1 AND active RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(password_hash)
            .bind(password_changed_stamp(now))
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()?
            .ok_or_else(missing_user)
    }

    async fn set_reset(
        &self,
        id: Uuid,
        digest: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_reset_digest = $2, password_reset_expires = $3, \
             updated_at = now() WHERE id = $1 AND active",
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        one_row(&result)
    }

    async fn clear_reset(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_reset_digest = NULL, password_reset_expires = NULL, \
             updated_at = now() WHERE id = $1 AND active",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        one_row(&result)
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET active = FALSE, updated_at = now() WHERE id = $1 AND active")
                .bind(id)
                .execute(&self.pool)
                .await?;
        one_row(&result)
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at");
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
