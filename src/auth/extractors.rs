use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{
    error::Error,
    state::AppState,
    tokens::repo_types::Scope,
    users::{
        repo_types::User,
        validator::{validate_token_plaintext, Validator},
    },
};

/// Resolves the bearer authentication token to its live, non-suspended owner.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(Error::InvalidAuthenticationToken)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(Error::InvalidAuthenticationToken)?;

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, token);
        if !v.valid() {
            return Err(Error::InvalidAuthenticationToken);
        }

        match state.users.find_for_token(Scope::Authentication, token).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(Error::NotFound) => {
                warn!("invalid or expired authentication token");
                Err(Error::InvalidAuthenticationToken)
            }
            Err(e) => Err(e),
        }
    }
}
