use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::password::Password;

time::serde::format_description!(pub(crate) date_only, Date, "[year]-[month]-[day]");

/// A human user of the service.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip)]
    pub id: i64, // internal row id, never exposed
    #[serde(skip)]
    pub version: i32,
    #[serde(skip)]
    pub created_at: OffsetDateTime,
    #[serde(skip)]
    pub updated_at: OffsetDateTime,
    pub user_id: Uuid, // public identifier
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(with = "date_only::option", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip)]
    pub activated: bool,
    #[serde(skip)]
    pub suspended: bool,
    #[serde(skip)]
    pub deleted: bool,
}

impl User {
    /// A candidate user that has not been stored yet. Storage fills in the
    /// ids, version and timestamps on insert.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            user_id: Uuid::nil(),
            email: email.into(),
            password: Password::default(),
            name: name.into(),
            friendly_name: None,
            birth_date: None,
            gender: None,
            country_code: None,
            time_zone: None,
            activated: false,
            suspended: false,
            deleted: false,
        }
    }
}

/// Raw `users` row as read from storage.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub version: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub friendly_name: Option<String>,
    pub birth_date: Option<Date>,
    pub gender: Option<String>,
    pub country_code: Option<String>,
    pub time_zone: Option<String>,
    pub activated: bool,
    pub suspended: bool,
    pub deleted: bool,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
            user_id: r.user_id,
            email: r.email,
            password: Password::from_hash(r.password_hash),
            name: r.name,
            friendly_name: r.friendly_name,
            birth_date: r.birth_date,
            gender: r.gender,
            country_code: r.country_code,
            time_zone: r.time_zone,
            activated: r.activated,
            suspended: r.suspended,
            deleted: r.deleted,
        }
    }
}

/// Server-assigned values returned by an insert.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct Inserted {
    pub id: i64,
    pub version: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Version and timestamp after a successful compare-and-swap update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Revision {
    pub version: i32,
    pub updated_at: OffsetDateTime,
}
