use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Store, EMAIL_CONSTRAINT};
use crate::{
    error::{Error, Result},
    tokens::repo_types::{Scope, TokenRow},
    users::repo_types::{Inserted, Revision, User, UserRow},
};

const USER_COLUMNS: &str = r#"
    users.id, users.version, users.created_at, users.updated_at,
    users.user_id, users.email, users.password_hash, users.name,
    users.friendly_name, users.birth_date, users.gender,
    users.country_code, users.time_zone, users.activated,
    users.suspended, users.deleted
"#;

/// Postgres-backed store. Relies on the `users_email_key` partial unique
/// index and on conditional updates for its guarantees.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Unique violations on the email index become `DuplicateEmail`; everything
/// else is an opaque storage failure.
fn map_write_error(e: sqlx::Error, what: &'static str) -> Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_CONSTRAINT) {
            return Error::DuplicateEmail;
        }
    }
    Error::Storage(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<Inserted> {
        sqlx::query_as::<_, Inserted>(
            r#"
            INSERT INTO users (
                user_id, email, password_hash, name, friendly_name, birth_date,
                gender, country_code, time_zone, activated, suspended
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, version, created_at, updated_at
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(password_hash)
        .bind(&user.name)
        .bind(&user.friendly_name)
        .bind(user.birth_date)
        .bind(&user.gender)
        .bind(&user.country_code)
        .bind(&user.time_zone)
        .bind(user.activated)
        .bind(user.suspended)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(users.email) = lower($1) AND users.deleted = false"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("select user by email")?;
        Ok(row.map(User::from))
    }

    async fn user_by_user_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE users.user_id = $1 AND users.deleted = false"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .context("select user by user_id")?;
        Ok(row.map(User::from))
    }

    async fn inspect_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.user_id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .context("inspect user")?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User, password_hash: &str) -> Result<Option<Revision>> {
        sqlx::query_as::<_, Revision>(
            r#"
            UPDATE users
               SET version = version + 1, updated_at = now(),
                   email = $1, password_hash = $2, name = $3, friendly_name = $4,
                   birth_date = $5, gender = $6, country_code = $7, time_zone = $8,
                   activated = $9, suspended = $10
             WHERE user_id = $11 AND version = $12 AND deleted = false
         RETURNING version, updated_at
            "#,
        )
        .bind(&user.email)
        .bind(password_hash)
        .bind(&user.name)
        .bind(&user.friendly_name)
        .bind(user.birth_date)
        .bind(&user.gender)
        .bind(&user.country_code)
        .bind(&user.time_zone)
        .bind(user.activated)
        .bind(user.suspended)
        .bind(user.user_id)
        .bind(user.version)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))
    }

    async fn soft_delete_user(&self, id: i64) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE users
               SET version = version + 1, updated_at = now(), deleted = true
             WHERE id = $1 AND deleted = false
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .context("soft delete user")?;
        Ok(done.rows_affected() > 0)
    }

    async fn insert_token(&self, token: &TokenRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.hash)
        .bind(token.user_id)
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&self.db)
        .await
        .context("insert token")?;
        Ok(())
    }

    async fn user_for_token(
        &self,
        hash: &[u8],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<Option<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
        INNER JOIN tokens ON users.id = tokens.user_id
             WHERE tokens.hash = $1
               AND tokens.scope = $2
               AND tokens.expiry > $3
               AND users.suspended = false
               AND users.deleted = false
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(hash)
            .bind(scope.as_str())
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .context("select user for token")?;
        Ok(row.map(User::from))
    }

    async fn delete_tokens(&self, user_id: i64, scope: Option<Scope>) -> Result<u64> {
        let done = sqlx::query(
            r#"
            DELETE FROM tokens
             WHERE user_id = $1
               AND ($2::text IS NULL OR scope = $2)
            "#,
        )
        .bind(user_id)
        .bind(scope.map(Scope::as_str))
        .execute(&self.db)
        .await
        .context("delete tokens")?;
        Ok(done.rows_affected())
    }
}
