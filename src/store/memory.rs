use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::Store;
use crate::{
    error::{Error, Result},
    tokens::repo_types::{Scope, TokenRow},
    users::repo_types::{Inserted, Revision, User, UserRow},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<UserRow>,
    tokens: Vec<TokenRow>,
}

/// In-process store with the same constraints as the Postgres schema:
/// case-insensitive email uniqueness over live rows, conditional updates and
/// the token/user visibility join. Backs tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`, to exercise storage deadlines.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    async fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.tables
            .lock()
            .map_err(|_| Error::Storage(anyhow::anyhow!("memory store lock poisoned")))
    }

    /// Number of stored token rows for a user, any scope.
    pub async fn token_count(&self, user_id: i64) -> Result<usize> {
        let t = self.tables().await?;
        Ok(t.tokens.iter().filter(|row| row.user_id == user_id).count())
    }
}

fn email_taken(t: &Tables, email: &str, except_id: Option<i64>) -> bool {
    t.users.iter().any(|row| {
        !row.deleted && Some(row.id) != except_id && row.email.eq_ignore_ascii_case(email)
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<Inserted> {
        let mut t = self.tables().await?;
        if email_taken(&t, &user.email, None) {
            return Err(Error::DuplicateEmail);
        }
        t.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = UserRow {
            id: t.next_id,
            version: 1,
            created_at: now,
            updated_at: now,
            user_id: user.user_id,
            email: user.email.clone(),
            password_hash: password_hash.to_owned(),
            name: user.name.clone(),
            friendly_name: user.friendly_name.clone(),
            birth_date: user.birth_date,
            gender: user.gender.clone(),
            country_code: user.country_code.clone(),
            time_zone: user.time_zone.clone(),
            activated: user.activated,
            suspended: user.suspended,
            deleted: false,
        };
        let inserted = Inserted {
            id: row.id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        t.users.push(row);
        Ok(inserted)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables().await?;
        Ok(t.users
            .iter()
            .find(|row| !row.deleted && row.email.eq_ignore_ascii_case(email))
            .cloned()
            .map(User::from))
    }

    async fn user_by_user_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let t = self.tables().await?;
        Ok(t.users
            .iter()
            .find(|row| !row.deleted && row.user_id == user_id)
            .cloned()
            .map(User::from))
    }

    async fn inspect_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let t = self.tables().await?;
        Ok(t.users
            .iter()
            .find(|row| row.user_id == user_id)
            .cloned()
            .map(User::from))
    }

    async fn update_user(&self, user: &User, password_hash: &str) -> Result<Option<Revision>> {
        let mut t = self.tables().await?;
        let Some(idx) = t.users.iter().position(|row| {
            !row.deleted && row.user_id == user.user_id && row.version == user.version
        }) else {
            return Ok(None);
        };
        let id = t.users[idx].id;
        if email_taken(&t, &user.email, Some(id)) {
            return Err(Error::DuplicateEmail);
        }
        let row = &mut t.users[idx];
        row.version += 1;
        row.updated_at = OffsetDateTime::now_utc();
        row.email = user.email.clone();
        row.password_hash = password_hash.to_owned();
        row.name = user.name.clone();
        row.friendly_name = user.friendly_name.clone();
        row.birth_date = user.birth_date;
        row.gender = user.gender.clone();
        row.country_code = user.country_code.clone();
        row.time_zone = user.time_zone.clone();
        row.activated = user.activated;
        row.suspended = user.suspended;
        Ok(Some(Revision {
            version: row.version,
            updated_at: row.updated_at,
        }))
    }

    async fn soft_delete_user(&self, id: i64) -> Result<bool> {
        let mut t = self.tables().await?;
        match t.users.iter_mut().find(|row| row.id == id && !row.deleted) {
            Some(row) => {
                row.deleted = true;
                row.version += 1;
                row.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_token(&self, token: &TokenRow) -> Result<()> {
        let mut t = self.tables().await?;
        if !t.users.iter().any(|row| row.id == token.user_id) {
            return Err(Error::Storage(anyhow::anyhow!(
                "token references unknown user {}",
                token.user_id
            )));
        }
        t.tokens.push(token.clone());
        Ok(())
    }

    async fn user_for_token(
        &self,
        hash: &[u8],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<Option<User>> {
        let t = self.tables().await?;
        let owner = t
            .tokens
            .iter()
            .filter(|tok| tok.hash == hash && tok.scope == scope && tok.expiry > now)
            .find_map(|tok| {
                t.users
                    .iter()
                    .find(|row| row.id == tok.user_id && !row.suspended && !row.deleted)
            });
        Ok(owner.cloned().map(User::from))
    }

    async fn delete_tokens(&self, user_id: i64, scope: Option<Scope>) -> Result<u64> {
        let mut t = self.tables().await?;
        let before = t.tokens.len();
        t.tokens
            .retain(|tok| !(tok.user_id == user_id && scope.map_or(true, |s| tok.scope == s)));
        Ok((before - t.tokens.len()) as u64)
    }
}
