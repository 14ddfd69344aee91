use std::collections::BTreeMap;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Field-keyed validation messages, one per field.
pub type FieldErrors = BTreeMap<String, String>;

/// Every failure a core operation can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed validation")]
    Validation(FieldErrors),

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("account is not activated or is suspended")]
    NotPermitted,

    #[error("storage operation timed out")]
    StorageTimeout,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("password verification failed: {0}")]
    Verification(String),

    #[error("missing password hash for user")]
    MissingPasswordHash,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error, fields) = match self {
            Error::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "failed validation".to_string(),
                Some(fields),
            ),
            Error::DuplicateEmail => {
                let mut fields = FieldErrors::new();
                fields.insert(
                    "email".into(),
                    "a user with this email address already exists".into(),
                );
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "failed validation".to_string(),
                    Some(fields),
                )
            }
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                "the requested resource could not be found".to_string(),
                None,
            ),
            Error::EditConflict => (
                StatusCode::CONFLICT,
                "unable to update the record due to an edit conflict, please try again"
                    .to_string(),
                None,
            ),
            Error::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid authentication credentials".to_string(),
                None,
            ),
            Error::InvalidAuthenticationToken => {
                let body = ErrorResponse {
                    error: "invalid or missing authentication token".to_string(),
                    fields: None,
                };
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    Json(body),
                )
                    .into_response();
            }
            Error::NotPermitted => (
                StatusCode::FORBIDDEN,
                "your user account doesn't have the necessary permissions to access this resource"
                    .to_string(),
                None,
            ),
            Error::StorageTimeout => {
                tracing::warn!("storage deadline exceeded");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "the server is temporarily unable to complete the request".to_string(),
                    None,
                )
            }
            other => {
                tracing::error!(error = %other, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the server encountered a problem and could not process your request"
                        .to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorResponse { error, fields })).into_response()
    }
}
