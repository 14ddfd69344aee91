use lazy_static::lazy_static;
use regex::Regex;
use time::{Date, Month, OffsetDateTime};

use super::repo_types::User;
use crate::{
    error::{Error, FieldErrors, Result},
    tokens::repo::TOKEN_BYTES,
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

pub const PASSWORD_MIN_BYTES: usize = 8;
pub const PASSWORD_MAX_BYTES: usize = 72;
const NAME_MAX_BYTES: usize = 500;
const GENDER_MAX_BYTES: usize = 64;
const MIN_AGE_YEARS: i32 = 13;
const MAX_AGE_YEARS: i32 = 120;

/// Collects field-keyed messages so one submission reports every problem at
/// once. The first message for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    pub errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    /// `Err(Error::Validation)` carrying everything collected so far.
    pub fn finish(self) -> Result<()> {
        if self.valid() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_valid_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= PASSWORD_MIN_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= PASSWORD_MAX_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_token_plaintext(v: &mut Validator, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_BYTES * 2
            && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')),
        "token",
        "must be 64 lowercase hexadecimal characters",
    );
}

/// Profile rules shared by registration and updates.
pub fn validate_profile(v: &mut Validator, user: &User) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(
        user.name.len() <= NAME_MAX_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );

    if let Some(friendly_name) = &user.friendly_name {
        v.check(
            friendly_name.len() <= NAME_MAX_BYTES,
            "friendly_name",
            "must not be more than 500 bytes long",
        );
    }

    if let Some(birth_date) = user.birth_date {
        validate_birth_date(v, birth_date, OffsetDateTime::now_utc().date());
    }

    if let Some(gender) = &user.gender {
        v.check(
            gender.len() <= GENDER_MAX_BYTES,
            "gender",
            "must not be more than 64 bytes long",
        );
    }

    if let Some(country_code) = &user.country_code {
        v.check(
            country_code.len() == 2,
            "country_code",
            "must be exactly two bytes long",
        );
    }

    if let Some(time_zone) = &user.time_zone {
        v.check(
            time_zone.parse::<chrono_tz::Tz>().is_ok(),
            "time_zone",
            "must be a valid time zone name",
        );
    }
}

/// Full pre-persistence check of a user.
///
/// # Panics
///
/// When the password carries neither a plaintext nor a hash. That user was
/// built incorrectly by the caller and must never reach storage.
pub fn validate_user(v: &mut Validator, user: &User) {
    validate_email(v, &user.email);

    if let Some(plaintext) = user.password.plaintext() {
        validate_password_plaintext(v, plaintext);
    }

    if user.password.hash().is_none() {
        panic!("missing password hash for user");
    }

    validate_profile(v, user);
}

fn years_before(today: Date, years: i32) -> Date {
    let year = today.year() - years;
    today.replace_year(year).unwrap_or_else(|_| {
        // 29 February in a non-leap target year
        Date::from_calendar_date(year, Month::February, 28).unwrap_or(today)
    })
}

fn validate_birth_date(v: &mut Validator, birth_date: Date, today: Date) {
    v.check(
        birth_date > years_before(today, MAX_AGE_YEARS),
        "birth_date",
        "must not be more than 120 years ago",
    );
    v.check(
        birth_date < years_before(today, MIN_AGE_YEARS),
        "birth_date",
        "must be more than 13 years ago",
    );
}
