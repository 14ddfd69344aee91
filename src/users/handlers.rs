use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{DeleteUserRequest, RegisterRequest, TokenRequest, UpdateUserRequest, UserResponse},
    repo_types::User,
    validator::{
        validate_email, validate_password_plaintext, validate_profile, validate_token_plaintext,
        validate_user, Validator,
    },
};
use crate::{auth::AuthUser, error::Error, state::AppState, tokens::repo_types::Scope};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users", delete(delete_user))
        .route("/users/activate", put(activate))
        .route("/users/authenticate", post(authenticate))
        .route("/users/me", patch(update_me))
        .route("/users/email/:email", get(get_by_email))
        .route("/users/id/:user_id", get(get_by_user_id))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let mut user = User::new(payload.email.trim(), payload.name);
    user.friendly_name = payload.friendly_name;
    user.birth_date = payload.birth_date;
    user.gender = payload.gender;
    user.country_code = payload.country_code;
    user.time_zone = payload.time_zone;

    // Never hash a plaintext outside the accepted length range.
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &payload.password);
    if !v.valid() {
        validate_email(&mut v, &user.email);
        validate_profile(&mut v, &user);
        warn!("registration failed validation");
        return Err(Error::Validation(v.errors));
    }

    user.password.set(&payload.password).await?;
    validate_user(&mut v, &user);
    v.finish()?;

    state.users.insert(&mut user).await?;

    let token = state
        .tokens
        .issue(
            user.id,
            state.config.tokens.activation_ttl(),
            Scope::Activation,
        )
        .await?;

    let mailer = state.mailer.clone();
    let recipient = user.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_activation(&recipient, &token).await {
            error!(error = %e, user_id = %recipient.user_id, "activation mail failed");
        }
    });

    info!(user_id = %user.user_id, "user registered");
    Ok((StatusCode::ACCEPTED, Json(UserResponse { user, version: None })))
}

#[instrument(skip(state, payload))]
pub async fn activate(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<UserResponse>, Error> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    v.finish()?;

    let mut user = match state
        .users
        .find_for_token(Scope::Activation, &payload.token)
        .await
    {
        Ok(u) => u,
        Err(Error::NotFound) => {
            let mut v = Validator::new();
            v.add_error("token", "invalid or expired activation token");
            return Err(Error::Validation(v.errors));
        }
        Err(e) => return Err(e),
    };

    user.activated = true;
    state.users.update(&mut user).await?;
    state.tokens.revoke_all(user.id, Scope::Activation).await?;

    info!(user_id = %user.user_id, "user activated");
    Ok(Json(UserResponse { user, version: None }))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<UserResponse>, Error> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    if !v.valid() {
        return Err(Error::InvalidAuthenticationToken);
    }

    let user = state
        .users
        .find_for_token(Scope::Authentication, &payload.token)
        .await
        .map_err(|e| match e {
            Error::NotFound => Error::InvalidAuthenticationToken,
            other => other,
        })?;

    debug!(user_id = %user.user_id, "user authenticated");
    Ok(Json(UserResponse { user, version: None }))
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, Error> {
    if let Some(expected) = payload.version {
        if expected != user.version {
            return Err(Error::EditConflict);
        }
    }

    if let Some(email) = payload.email {
        user.email = email.trim().to_string();
    }
    if let Some(name) = payload.name {
        user.name = name;
    }
    if let Some(friendly_name) = payload.friendly_name {
        user.friendly_name = friendly_name;
    }
    if let Some(birth_date) = payload.birth_date {
        user.birth_date = birth_date;
    }
    if let Some(gender) = payload.gender {
        user.gender = gender;
    }
    if let Some(country_code) = payload.country_code {
        user.country_code = country_code;
    }
    if let Some(time_zone) = payload.time_zone {
        user.time_zone = time_zone;
    }

    let mut v = Validator::new();
    if let Some(password) = &payload.password {
        validate_password_plaintext(&mut v, password);
        if !v.valid() {
            validate_email(&mut v, &user.email);
            validate_profile(&mut v, &user);
            return Err(Error::Validation(v.errors));
        }
        user.password.set(password).await?;
    }
    validate_user(&mut v, &user);
    v.finish()?;

    state.users.update(&mut user).await?;

    info!(user_id = %user.user_id, version = user.version, "profile updated");
    let version = Some(user.version);
    Ok(Json(UserResponse { user, version }))
}

#[instrument(skip(state))]
pub async fn get_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, Error> {
    let mut v = Validator::new();
    validate_email(&mut v, &email);
    v.finish()?;

    let user = state.users.find_by_email(&email).await?;
    visible(user)
}

#[instrument(skip(state))]
pub async fn get_by_user_id(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, Error> {
    let user = state.users.find_by_user_id(user_id).await?;
    visible(user)
}

fn visible(user: User) -> Result<Json<UserResponse>, Error> {
    if !user.activated || user.suspended {
        return Err(Error::NotPermitted);
    }
    Ok(Json(UserResponse { user, version: None }))
}

#[instrument(skip(state, payload))]
pub async fn delete_user(
    State(state): State<AppState>,
    Json(payload): Json<DeleteUserRequest>,
) -> Result<StatusCode, Error> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    v.finish()?;

    state.users.delete(&payload.email).await?;
    info!("user deleted");
    Ok(StatusCode::NO_CONTENT)
}
