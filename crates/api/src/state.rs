//! Application state

use std::sync::Arc;

use launchkit_billing::BillingService;
use sqlx::PgPool;

use crate::auth::JwtVerifier;
use crate::clerk::{ClerkClient, ClerkWebhookVerifier};
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub clerk: ClerkClient,
    pub clerk_webhooks: ClerkWebhookVerifier,
    pub jwt_verifier: JwtVerifier,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let billing = Arc::new(BillingService::from_env(pool.clone())?);
        tracing::info!("Polar billing service initialized");

        let clerk = ClerkClient::new(config.clerk_secret_key.clone());
        let clerk_webhooks = ClerkWebhookVerifier::new(&config.clerk_webhook_secret)?;
        let jwt_verifier = JwtVerifier::from_pem(&config.clerk_jwt_public_key)?;
        tracing::info!("Clerk authentication initialized");

        Ok(Self {
            pool,
            config,
            billing,
            clerk,
            clerk_webhooks,
            jwt_verifier,
        })
    }
}
