use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub activation_ttl_hours: i64,
    pub authentication_ttl_hours: i64,
}

impl TokenConfig {
    pub fn activation_ttl(&self) -> time::Duration {
        time::Duration::hours(self.activation_ttl_hours)
    }

    pub fn authentication_ttl(&self) -> time::Duration {
        time::Duration::hours(self.authentication_ttl_hours)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            activation_ttl_hours: 3 * 24,
            authentication_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub storage_timeout_secs: u64,
    pub tokens: TokenConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let defaults = TokenConfig::default();
        let tokens = TokenConfig {
            activation_ttl_hours: env_or(
                "ACTIVATION_TOKEN_TTL_HOURS",
                defaults.activation_ttl_hours,
            ),
            authentication_ttl_hours: env_or(
                "AUTH_TOKEN_TTL_HOURS",
                defaults.authentication_ttl_hours,
            ),
        };
        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 25),
            storage_timeout_secs: env_or("STORAGE_TIMEOUT_SECS", 3),
            tokens,
        })
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}
