//! Storage seam. Row-level primitives only: uniqueness and compare-and-swap
//! are enforced by the engine behind the trait, not by the callers.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    tokens::repo_types::{Scope, TokenRow},
    users::repo_types::{Inserted, Revision, User},
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Name of the partial unique index over `lower(email)` for live rows.
pub const EMAIL_CONSTRAINT: &str = "users_email_key";

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user row. Fails with `DuplicateEmail` when a live row already
    /// holds the same email (case-insensitive).
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<Inserted>;

    /// Live (non-deleted) user by email, case-insensitive.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Live (non-deleted) user by public id.
    async fn user_by_user_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Any user by public id, deleted rows included.
    async fn inspect_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Conditional update keyed on `(user_id, version)` of a live row.
    /// `Ok(None)` means the version no longer matches.
    async fn update_user(&self, user: &User, password_hash: &str) -> Result<Option<Revision>>;

    /// Mark a live row deleted and bump its version. `Ok(false)` when the row
    /// was already deleted or is absent.
    async fn soft_delete_user(&self, id: i64) -> Result<bool>;

    async fn insert_token(&self, token: &TokenRow) -> Result<()>;

    /// The live, non-suspended owner of an unexpired token with this hash and
    /// scope.
    async fn user_for_token(
        &self,
        hash: &[u8],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<Option<User>>;

    /// Delete a user's tokens, restricted to `scope` when given. Returns the
    /// number of rows removed.
    async fn delete_tokens(&self, user_id: i64, scope: Option<Scope>) -> Result<u64>;
}

/// Run a storage call under `deadline`, reporting `StorageTimeout` when it
/// does not finish in time.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Error::StorageTimeout)?
}
