use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Activation, Scope::Authentication];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued bearer token. Only `hash` is ever persisted; `plaintext`
/// is handed to the caller once.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("hash", &hex::encode(&self.hash))
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Persisted form of a token.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: OffsetDateTime,
    pub scope: Scope,
}

impl From<&Token> for TokenRow {
    fn from(t: &Token) -> Self {
        Self {
            hash: t.hash.clone(),
            user_id: t.user_id,
            expiry: t.expiry,
            scope: t.scope,
        }
    }
}
