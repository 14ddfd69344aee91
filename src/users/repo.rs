use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::repo_types::{Revision, User};
use crate::{
    error::{Error, Result},
    store::{with_deadline, Store},
    tokens::{repo::TokenModel, repo_types::Scope},
};

/// User records with optimistic concurrency and soft delete. Every storage
/// call runs under the configured deadline.
#[derive(Clone)]
pub struct UserModel {
    store: Arc<dyn Store>,
    tokens: TokenModel,
    deadline: Duration,
}

impl UserModel {
    pub fn new(store: Arc<dyn Store>, tokens: TokenModel, deadline: Duration) -> Self {
        Self {
            store,
            tokens,
            deadline,
        }
    }

    /// Store a new user. Assigns the public id, row id, version 1 and the
    /// timestamps onto `user`.
    pub async fn insert(&self, user: &mut User) -> Result<()> {
        let hash = user.password.require_hash()?.to_owned();
        user.user_id = Uuid::new_v4();
        let inserted = with_deadline(self.deadline, self.store.insert_user(user, &hash))
            .await
            .map_err(|e| {
                if matches!(e, Error::DuplicateEmail) {
                    warn!(user_id = %user.user_id, "insert rejected: duplicate email");
                }
                e
            })?;
        user.id = inserted.id;
        user.version = inserted.version;
        user.created_at = inserted.created_at;
        user.updated_at = inserted.updated_at;
        info!(user_id = %user.user_id, "user inserted");
        Ok(())
    }

    /// The live user with this email, compared case-insensitively.
    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        with_deadline(self.deadline, self.store.user_by_email(email))
            .await?
            .ok_or(Error::NotFound)
    }

    /// The live user with this public id.
    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<User> {
        with_deadline(self.deadline, self.store.user_by_user_id(user_id))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Administrative read that also sees soft-deleted rows.
    pub async fn inspect(&self, user_id: Uuid) -> Result<User> {
        with_deadline(self.deadline, self.store.inspect_user(user_id))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Persist `user` if its `version` is still the stored one. On success the
    /// new version and timestamp are written back and returned.
    pub async fn update(&self, user: &mut User) -> Result<Revision> {
        let hash = user.password.require_hash()?.to_owned();
        let revision = with_deadline(self.deadline, self.store.update_user(user, &hash))
            .await?
            .ok_or_else(|| {
                debug!(user_id = %user.user_id, version = user.version, "edit conflict");
                Error::EditConflict
            })?;
        user.version = revision.version;
        user.updated_at = revision.updated_at;
        info!(user_id = %user.user_id, version = user.version, "user updated");
        Ok(revision)
    }

    /// Soft-delete the live user with this email after dropping all of its
    /// tokens. The two steps are independent; a retry after a partial run
    /// completes the remaining step.
    pub async fn delete(&self, email: &str) -> Result<()> {
        let user = self.find_by_email(email).await?;
        self.tokens.revoke_every_scope(user.id).await?;
        let marked = with_deadline(self.deadline, self.store.soft_delete_user(user.id)).await?;
        if !marked {
            return Err(Error::NotFound);
        }
        info!(user_id = %user.user_id, "user deleted");
        Ok(())
    }

    /// The user owning a live token in `scope`.
    pub async fn find_for_token(&self, scope: Scope, plaintext: &str) -> Result<User> {
        let user = self.tokens.resolve(scope, plaintext).await?;
        if user.suspended || user.deleted {
            return Err(Error::NotFound);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, users::password::Password};

    fn models(store: Arc<MemoryStore>) -> (UserModel, TokenModel) {
        let deadline = Duration::from_secs(3);
        let tokens = TokenModel::new(store.clone(), deadline);
        let users = UserModel::new(store, tokens.clone(), deadline);
        (users, tokens)
    }

    fn candidate(email: &str) -> User {
        let mut user = User::new(email, "Test User");
        user.password = Password::from_hash("$argon2id$stored");
        user
    }

    #[tokio::test]
    async fn insert_assigns_server_fields() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        let mut user = candidate("a@x.com");
        users.insert(&mut user).await.unwrap();
        assert!(user.id > 0);
        assert!(!user.user_id.is_nil());
        assert_eq!(user.version, 1);
        assert!(!user.activated);

        let found = users.find_by_email("A@X.com").await.unwrap();
        assert_eq!(found.user_id, user.user_id);
        let found = users.find_by_user_id(user.user_id).await.unwrap();
        assert_eq!(found.email, "a@x.com");
    }

    #[tokio::test]
    async fn insert_without_hash_never_reaches_storage() {
        let store = Arc::new(MemoryStore::new());
        let (users, _) = models(store);
        let mut user = User::new("a@x.com", "Alice");
        let err = users.insert(&mut user).await.unwrap_err();
        assert!(matches!(err, Error::MissingPasswordHash));
        assert!(matches!(
            users.find_by_email("a@x.com").await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn case_variant_email_is_duplicate_until_deleted() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        users.insert(&mut candidate("a@x.com")).await.unwrap();

        let err = users.insert(&mut candidate("A@x.com")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));

        users.delete("a@x.com").await.unwrap();
        users.insert(&mut candidate("A@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn find_missing_is_not_found() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        assert!(matches!(
            users.find_by_email("nobody@x.com").await.unwrap_err(),
            Error::NotFound
        ));
        assert!(matches!(
            users.find_by_user_id(Uuid::new_v4()).await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn concurrent_updates_one_wins() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        let mut original = candidate("a@x.com");
        users.insert(&mut original).await.unwrap();

        let mut first = users.find_by_email("a@x.com").await.unwrap();
        let mut second = users.find_by_email("a@x.com").await.unwrap();
        first.name = "First".into();
        second.name = "Second".into();

        let (a, b) = tokio::join!(users.update(&mut first), users.update(&mut second));
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser.unwrap_err(), Error::EditConflict));

        let stored = users.find_by_email("a@x.com").await.unwrap();
        assert_eq!(stored.version, 2);

        // re-read and retry succeeds
        let mut retry = stored;
        retry.name = "Retry".into();
        let rev = users.update(&mut retry).await.unwrap();
        assert_eq!(rev.version, 3);
        assert_eq!(retry.version, 3);
    }

    #[tokio::test]
    async fn update_into_taken_email_is_duplicate() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        users.insert(&mut candidate("a@x.com")).await.unwrap();
        let mut b = candidate("b@x.com");
        users.insert(&mut b).await.unwrap();

        b.email = "A@X.COM".into();
        let err = users.update(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));
        assert_eq!(b.version, 1);
    }

    #[tokio::test]
    async fn delete_is_soft_and_idempotent() {
        let (users, tokens) = models(Arc::new(MemoryStore::new()));
        let mut user = candidate("a@x.com");
        users.insert(&mut user).await.unwrap();
        let token = tokens
            .issue(user.id, time::Duration::hours(24), Scope::Authentication)
            .await
            .unwrap();

        users.delete("a@x.com").await.unwrap();
        assert!(matches!(
            users.delete("a@x.com").await.unwrap_err(),
            Error::NotFound
        ));
        assert!(matches!(
            users.find_by_email("a@x.com").await.unwrap_err(),
            Error::NotFound
        ));
        assert!(matches!(
            users
                .find_for_token(Scope::Authentication, &token.plaintext)
                .await
                .unwrap_err(),
            Error::NotFound
        ));

        let row = users.inspect(user.user_id).await.unwrap();
        assert!(row.deleted);
        assert_eq!(row.version, 2);
    }

    #[tokio::test]
    async fn delete_retry_after_token_cascade_completes() {
        let store = Arc::new(MemoryStore::new());
        let (users, tokens) = models(store.clone());
        let mut user = candidate("a@x.com");
        users.insert(&mut user).await.unwrap();
        tokens
            .issue(user.id, time::Duration::days(3), Scope::Activation)
            .await
            .unwrap();

        // first attempt got as far as the token cascade
        tokens.revoke_every_scope(user.id).await.unwrap();
        assert_eq!(store.token_count(user.id).await.unwrap(), 0);

        users.delete("a@x.com").await.unwrap();
        assert!(users.inspect(user.user_id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn updates_on_deleted_rows_conflict() {
        let (users, _) = models(Arc::new(MemoryStore::new()));
        let mut user = candidate("a@x.com");
        users.insert(&mut user).await.unwrap();
        users.delete("a@x.com").await.unwrap();
        user.name = "Ghost".into();
        assert!(matches!(
            users.update(&mut user).await.unwrap_err(),
            Error::EditConflict
        ));
    }

    #[tokio::test]
    async fn suspended_users_are_invisible_to_tokens() {
        let (users, tokens) = models(Arc::new(MemoryStore::new()));
        let mut user = candidate("a@x.com");
        users.insert(&mut user).await.unwrap();
        let token = tokens
            .issue(user.id, time::Duration::hours(24), Scope::Authentication)
            .await
            .unwrap();
        users
            .find_for_token(Scope::Authentication, &token.plaintext)
            .await
            .unwrap();

        user.suspended = true;
        users.update(&mut user).await.unwrap();
        assert!(matches!(
            users
                .find_for_token(Scope::Authentication, &token.plaintext)
                .await
                .unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn registration_and_activation_flow() {
        let (users, tokens) = models(Arc::new(MemoryStore::new()));
        let mut user = User::new("a@x.com", "Alice");
        user.password.set("password123").await.unwrap();
        users.insert(&mut user).await.unwrap();
        assert_eq!(user.version, 1);
        assert!(!user.activated);

        let token = tokens
            .issue(user.id, time::Duration::days(3), Scope::Activation)
            .await
            .unwrap();
        let mut found = users
            .find_for_token(Scope::Activation, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(found.user_id, user.user_id);

        found.activated = true;
        let rev = users.update(&mut found).await.unwrap();
        assert_eq!(rev.version, 2);

        tokens.revoke_all(found.id, Scope::Activation).await.unwrap();
        assert!(matches!(
            users
                .find_for_token(Scope::Activation, &token.plaintext)
                .await
                .unwrap_err(),
            Error::NotFound
        ));

        let stored = users.find_by_email("a@x.com").await.unwrap();
        assert!(stored.activated);
        assert!(stored.password.matches("password123").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storage_is_a_timeout() {
        let (users, _) = models(Arc::new(MemoryStore::with_latency(Duration::from_secs(5))));
        let err = users.find_by_email("a@x.com").await.unwrap_err();
        assert!(matches!(err, Error::StorageTimeout));
    }
}
