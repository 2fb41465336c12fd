use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::{postgres::PgQueryResult, PgPool};
use tracing::{debug_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    password::CredentialHasher,
    repo_types::{NewUser, ProfileUpdate, User},
};

/// Durable store of user records. All lookups ignore soft-deleted rows.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Hash the password and persist a new user; `DuplicateKey` when email or
    /// username is already used by an active user.
    async fn insert_user(&self, new: NewUser<'_>) -> Result<Uuid, AuthError>;
    async fn user_by_email(&self, email: &str) -> Result<User, AuthError>;
    async fn user_by_id(&self, id: Uuid) -> Result<User, AuthError>;
    /// Id and stored hash for the active user with this username.
    async fn credentials_by_username(&self, username: &str) -> Result<(Uuid, String), AuthError>;
    async fn list_users(&self) -> Result<Vec<User>, AuthError>;
    async fn update_profile(&self, id: Uuid, profile: &ProfileUpdate) -> Result<(), AuthError>;
    async fn set_reset_code(&self, id: Uuid, code: &str) -> Result<(), AuthError>;
    /// Replace the hash and clear the reset code in one step, only if
    /// `reset_code` is still the pending code for `email`.
    async fn update_password(
        &self,
        email: &str,
        new_hash: &str,
        reset_code: &str,
    ) -> Result<(), AuthError>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), AuthError>;
    async fn change_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError>;
}

const USER_COLUMNS: &str = "id, name, email, username, password_hash, password_reset_code, \
                            created_at, updated_at, deleted_at";

pub struct PgUserDirectory {
    db: PgPool,
    hasher: CredentialHasher,
    timeout: Duration,
}

impl PgUserDirectory {
    pub fn new(db: PgPool, hasher: CredentialHasher, timeout: Duration) -> Self {
        Self { db, hasher, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        bounded(self.timeout, op, fut).await
    }

    async fn fetch_user(
        &self,
        op: &'static str,
        filter: &str,
        bind: UserKey<'_>,
    ) -> Result<User, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} AND deleted_at IS NULL");
        let query = sqlx::query_as::<_, User>(&sql);
        let query = match bind {
            UserKey::Id(id) => query.bind(id),
            UserKey::Text(text) => query.bind(text),
        };
        self.bounded(op, query.fetch_optional(&self.db))
            .await?
            .ok_or(AuthError::NotFound)
    }
}

/// Run one statement under the storage deadline.
async fn bounded<T, F>(
    timeout: Duration,
    op: &'static str,
    fut: F,
) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let span = debug_span!("db.query", db.system = "postgresql", db.operation = op);
    match tokio::time::timeout(timeout, fut.instrument(span)).await {
        Ok(res) => res.map_err(AuthError::from),
        Err(_) => {
            warn!(operation = op, ?timeout, "query deadline exceeded");
            Err(AuthError::Timeout)
        }
    }
}

enum UserKey<'a> {
    Id(Uuid),
    Text(&'a str),
}

fn require_row(res: PgQueryResult) -> Result<(), AuthError> {
    if res.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn insert_user(&self, new: NewUser<'_>) -> Result<Uuid, AuthError> {
        let hash = self.hasher.hash(new.password)?;
        let id = self
            .bounded(
                "insert_user",
                sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO users (id, name, email, username, password_hash)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(new.name)
                .bind(new.email)
                .bind(new.username)
                .bind(&hash)
                .fetch_one(&self.db),
            )
            .await?;
        Ok(id)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, AuthError> {
        self.fetch_user("user_by_email", "email = $1", UserKey::Text(email))
            .await
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        self.fetch_user("user_by_id", "id = $1", UserKey::Id(id)).await
    }

    async fn credentials_by_username(&self, username: &str) -> Result<(Uuid, String), AuthError> {
        self.bounded(
            "credentials_by_username",
            sqlx::query_as::<_, (Uuid, String)>(
                r#"
                SELECT id, password_hash
                FROM users
                WHERE username = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(username)
            .fetch_optional(&self.db),
        )
        .await?
        .ok_or(AuthError::NotFound)
    }

    async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at ASC"
        );
        self.bounded(
            "list_users",
            sqlx::query_as::<_, User>(&sql).fetch_all(&self.db),
        )
        .await
    }

    async fn update_profile(&self, id: Uuid, profile: &ProfileUpdate) -> Result<(), AuthError> {
        let res = self
            .bounded(
                "update_profile",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET name = $1, email = $2, username = $3, updated_at = now()
                    WHERE id = $4 AND deleted_at IS NULL
                    "#,
                )
                .bind(&profile.name)
                .bind(&profile.email)
                .bind(&profile.username)
                .bind(id)
                .execute(&self.db),
            )
            .await?;
        require_row(res)
    }

    async fn set_reset_code(&self, id: Uuid, code: &str) -> Result<(), AuthError> {
        let res = self
            .bounded(
                "set_reset_code",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET password_reset_code = $1, updated_at = now()
                    WHERE id = $2 AND deleted_at IS NULL
                    "#,
                )
                .bind(code)
                .bind(id)
                .execute(&self.db),
            )
            .await?;
        require_row(res)
    }

    async fn update_password(
        &self,
        email: &str,
        new_hash: &str,
        reset_code: &str,
    ) -> Result<(), AuthError> {
        let res = self
            .bounded(
                "update_password",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET password_hash = $1, password_reset_code = NULL, updated_at = now()
                    WHERE email = $2 AND password_reset_code = $3 AND deleted_at IS NULL
                    "#,
                )
                .bind(new_hash)
                .bind(email)
                .bind(reset_code)
                .execute(&self.db),
            )
            .await?;
        require_row(res)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AuthError> {
        let res = self
            .bounded(
                "soft_delete",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET deleted_at = now(), updated_at = now()
                    WHERE id = $1 AND deleted_at IS NULL
                    "#,
                )
                .bind(id)
                .execute(&self.db),
            )
            .await?;
        require_row(res)
    }

    async fn change_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let hash = self.hasher.hash(new_password)?;
        let res = self
            .bounded(
                "change_password",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET password_hash = $1, password_reset_code = NULL, updated_at = now()
                    WHERE id = $2 AND deleted_at IS NULL
                    "#,
                )
                .bind(&hash)
                .bind(id)
                .execute(&self.db),
            )
            .await?;
        require_row(res)
    }
}
