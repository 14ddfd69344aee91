use std::fmt;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::repo_types::{Scope, Token};
use crate::{
    error::Error,
    state::AppState,
    users::validator::{validate_email, validate_password_plaintext, Validator},
};

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/tokens/authentication", post(create_authentication_token))
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: Token,
}

#[instrument(skip(state, payload))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthenticationTokenResponse>), Error> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.finish()?;

    // Unknown address and wrong password look the same to the caller.
    let user = match state.users.find_by_email(&payload.email).await {
        Ok(u) => u,
        Err(Error::NotFound) => return Err(Error::InvalidCredentials),
        Err(e) => return Err(e),
    };
    if !user.password.matches(&payload.password).await? {
        return Err(Error::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(
            user.id,
            state.config.tokens.authentication_ttl(),
            Scope::Authentication,
        )
        .await?;

    info!(user_id = %user.user_id, "authentication token issued");
    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenResponse {
            authentication_token: token,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};
    use tower::ServiceExt;

    use super::*;
    use crate::{app::build_app, users::repo_types::User};

    async fn post_credentials(state: &AppState, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/v1/tokens/authentication")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn seed(state: &AppState) -> User {
        let mut user = User::new("bob@x.com", "Bob");
        user.password.set("correct horse").await.unwrap();
        state.users.insert(&mut user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn issues_token_for_valid_credentials() {
        let state = AppState::fake();
        let user = seed(&state).await;

        let (status, body) = post_credentials(
            &state,
            json!({ "email": "BOB@x.com", "password": "correct horse" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let token = body["authentication_token"]["token"].as_str().unwrap();
        assert_eq!(token.len(), 64);
        let expiry = body["authentication_token"]["expiry"].as_str().unwrap();
        let expiry = OffsetDateTime::parse(expiry, &Rfc3339).unwrap();
        assert!(expiry > OffsetDateTime::now_utc() + time::Duration::hours(23));

        let owner = state
            .tokens
            .resolve(Scope::Authentication, token)
            .await
            .unwrap();
        assert_eq!(owner.user_id, user.user_id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let state = AppState::fake();
        seed(&state).await;

        let (wrong, wrong_body) = post_credentials(
            &state,
            json!({ "email": "bob@x.com", "password": "battery staple" }),
        )
        .await;
        let (unknown, unknown_body) = post_credentials(
            &state,
            json!({ "email": "carol@x.com", "password": "battery staple" }),
        )
        .await;
        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body, unknown_body);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let req = CredentialsRequest {
            email: "bob@x.com".into(),
            password: "correct horse".into(),
        };
        let out = format!("{:?}", req);
        assert!(out.contains("bob@x.com"));
        assert!(!out.contains("correct horse"));
    }

    #[tokio::test]
    async fn malformed_credentials_fail_validation() {
        let state = AppState::fake();
        let (status, body) =
            post_credentials(&state, json!({ "email": "", "password": "short" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"]["email"], "must be provided");
        assert!(body["fields"]["password"].is_string());
    }
}
