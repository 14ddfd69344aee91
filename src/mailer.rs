use async_trait::async_trait;
use tracing::info;

use crate::{tokens::repo_types::Token, users::repo_types::User};

/// Outbound delivery of activation tokens.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()>;
}

/// Used when no delivery channel is configured. Records that a mail would
/// have been sent, never its token.
#[derive(Clone, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        info!(
            user_id = %user.user_id,
            expiry = %token.expiry,
            "mail delivery not configured; activation mail skipped"
        );
        Ok(())
    }
}
