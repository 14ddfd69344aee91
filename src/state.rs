use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::AppConfig,
    mailer::{DisabledMailer, Mailer},
    metrics::Metrics,
    store::{PgStore, Store},
    tokens::repo::TokenModel,
    users::repo::UserModel,
};

/// Apply `./migrations`. Email uniqueness lives in the schema, so a failure
/// here must stop startup.
pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserModel,
    pub tokens: TokenModel,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        run_migrations(&db).await?;
        tracing::info!("database connection pool established");

        let store = Arc::new(PgStore::new(db)) as Arc<dyn Store>;
        let metrics = Arc::new(Metrics::new().context("register metrics")?);
        Ok(Self::from_parts(
            config,
            store,
            Arc::new(DisabledMailer),
            metrics,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let deadline = config.storage_timeout();
        let tokens = TokenModel::new(store.clone(), deadline);
        let users = UserModel::new(store, tokens.clone(), deadline);
        Self {
            config,
            users,
            tokens,
            mailer,
            metrics,
        }
    }

    /// In-memory state for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_mailer(Arc::new(DisabledMailer))
    }

    #[cfg(test)]
    pub fn fake_with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: "memory://".into(),
            db_max_connections: 1,
            storage_timeout_secs: 3,
            tokens: crate::config::TokenConfig::default(),
        });
        let store = Arc::new(crate::store::MemoryStore::new()) as Arc<dyn Store>;
        let metrics = Arc::new(Metrics::new().unwrap());
        Self::from_parts(config, store, mailer, metrics)
    }
}
