use std::{sync::Arc, time::Duration};

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::debug;

use super::repo_types::{Scope, Token, TokenRow};
use crate::{
    error::{Error, Result},
    store::{with_deadline, Store},
    users::repo_types::User,
};

/// Random bytes per token before hex encoding (64 hex chars).
pub const TOKEN_BYTES: usize = 32;

/// Digest stored in place of a token plaintext. Tokens carry their own
/// entropy, so a single unsalted SHA-256 pass is enough.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Build a new token for `user_id` valid for `ttl` from `now`.
pub fn generate_token(user_id: i64, ttl: time::Duration, scope: Scope, now: OffsetDateTime) -> Token {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    let hash = hash_token(&plaintext);
    Token {
        plaintext,
        hash,
        user_id,
        expiry: now + ttl,
        scope,
    }
}

/// Issues, resolves and revokes scoped bearer tokens.
#[derive(Clone)]
pub struct TokenModel {
    store: Arc<dyn Store>,
    deadline: Duration,
}

impl TokenModel {
    pub fn new(store: Arc<dyn Store>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Mint and persist a token. The returned plaintext is the only copy.
    pub async fn issue(&self, user_id: i64, ttl: time::Duration, scope: Scope) -> Result<Token> {
        let token = generate_token(user_id, ttl, scope, OffsetDateTime::now_utc());
        let row = TokenRow::from(&token);
        with_deadline(self.deadline, self.store.insert_token(&row)).await?;
        debug!(user_id, %scope, expiry = %token.expiry, "token issued");
        Ok(token)
    }

    /// The owner of a live token in `scope`. Wrong token, wrong scope,
    /// expiry and a suspended or deleted owner all surface as `NotFound`.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<User> {
        self.resolve_at(scope, plaintext, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn resolve_at(
        &self,
        scope: Scope,
        plaintext: &str,
        now: OffsetDateTime,
    ) -> Result<User> {
        let hash = hash_token(plaintext);
        let user = with_deadline(self.deadline, self.store.user_for_token(&hash, scope, now))
            .await?
            .ok_or(Error::NotFound)?;
        debug!(user_id = %user.user_id, %scope, "token resolved");
        Ok(user)
    }

    /// Delete every token of `scope` held by `user_id`. Succeeds when there
    /// is nothing to delete.
    pub async fn revoke_all(&self, user_id: i64, scope: Scope) -> Result<()> {
        let removed =
            with_deadline(self.deadline, self.store.delete_tokens(user_id, Some(scope))).await?;
        debug!(user_id, %scope, removed, "tokens revoked");
        Ok(())
    }

    /// Delete every token held by `user_id`, whatever its scope.
    pub async fn revoke_every_scope(&self, user_id: i64) -> Result<()> {
        let removed = with_deadline(self.deadline, self.store.delete_tokens(user_id, None)).await?;
        debug!(user_id, removed, "all tokens revoked");
        Ok(())
    }
}
