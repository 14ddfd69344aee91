use std::fmt;

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{Error, Result};

/// Argon2id memory cost in KiB. With two passes this lands in the tens of
/// milliseconds per verification on commodity hardware.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| Error::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a self-describing PHC string. The salt is
/// embedded in the output.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            Error::Hashing(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Compare a plaintext against a stored digest. A wrong password is
/// `Ok(false)`; a digest that cannot be parsed or evaluated is an error.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        Error::Verification(e.to_string())
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "argon2 verify_password error");
            Err(Error::Verification(e.to_string()))
        }
    }
}

/// A user's password: the plaintext is kept in memory only between `set`
/// and persistence, the hash is what gets stored.
#[derive(Clone, Default)]
pub struct Password {
    plaintext: Option<String>,
    hash: Option<String>,
}

impl Password {
    /// Wrap a hash loaded from storage.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            plaintext: None,
            hash: Some(hash.into()),
        }
    }

    /// Hash `plaintext` on the blocking pool and retain both forms.
    pub async fn set(&mut self, plaintext: &str) -> Result<()> {
        let plain = plaintext.to_owned();
        let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| Error::Hashing(e.to_string()))??;
        self.plaintext = Some(plaintext.to_owned());
        self.hash = Some(hash);
        Ok(())
    }

    /// Check `plaintext` against the stored hash on the blocking pool.
    pub async fn matches(&self, plaintext: &str) -> Result<bool> {
        let hash = self.require_hash()?.to_owned();
        let plain = plaintext.to_owned();
        tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .map_err(|e| Error::Verification(e.to_string()))?
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref()
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub(crate) fn require_hash(&self) -> Result<&str> {
        self.hash.as_deref().ok_or(Error::MissingPasswordHash)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "<redacted>"))
            .field("hash", &self.hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[test]
    fn same_plaintext_gets_distinct_salts() {
        let a = hash_password("password123").unwrap();
        let b = hash_password("password123").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("password123", &a).unwrap());
        assert!(verify_password("password123", &b).unwrap());
    }

    #[test]
    fn hashes_are_argon2id_phc_strings() {
        let hash = hash_password("password123").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$"));
    }

    #[tokio::test]
    async fn set_retains_plaintext_and_hash() {
        let mut password = Password::default();
        password.set("password123").await.unwrap();
        assert_eq!(password.plaintext(), Some("password123"));
        assert!(password.hash().is_some());
        assert!(password.matches("password123").await.unwrap());
        assert!(!password.matches("password124").await.unwrap());
    }

    #[tokio::test]
    async fn loaded_hash_has_no_plaintext() {
        let hash = hash_password("password123").unwrap();
        let password = Password::from_hash(hash);
        assert!(password.plaintext().is_none());
        assert!(password.matches("password123").await.unwrap());
    }

    #[tokio::test]
    async fn matches_without_hash_is_an_error() {
        let password = Password::default();
        let err = password.matches("password123").await.unwrap_err();
        assert!(matches!(err, Error::MissingPasswordHash));
    }

    #[test]
    fn debug_output_is_redacted() {
        let password = Password::from_hash("$argon2id$secret");
        let out = format!("{:?}", password);
        assert!(!out.contains("secret"));
    }
}
