use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::Date;

use super::repo_types::{date_only, User};

/// Keeps an explicit `null` apart from an absent field: absent is `None`,
/// `null` is `Some(None)`.
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

fn nullable_date<'de, D>(d: D) -> Result<Option<Option<Date>>, D::Error>
where
    D: Deserializer<'de>,
{
    date_only::option::deserialize(d).map(Some)
}

/// Request body for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub friendly_name: Option<String>,
    #[serde(default, with = "date_only::option")]
    pub birth_date: Option<Date>,
    pub gender: Option<String>,
    pub country_code: Option<String>,
    pub time_zone: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Request body carrying a token plaintext (activation, token authentication).
#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// Partial profile update. Absent fields are left unchanged; an explicit
/// `null` clears a nullable field.
#[derive(Default, Deserialize)]
pub struct UpdateUserRequest {
    /// Version the client last read; a mismatch is an edit conflict.
    pub version: Option<i32>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub friendly_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_date")]
    pub birth_date: Option<Option<Date>>,
    #[serde(default, deserialize_with = "nullable")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub country_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub time_zone: Option<Option<String>>,
}

impl fmt::Debug for UpdateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateUserRequest")
            .field("version", &self.version)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Request body for user deletion.
#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub email: String,
}

/// `{"user": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}
