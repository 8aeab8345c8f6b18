// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Launchkit Billing Module
//!
//! Handles Polar integration: reconciling webhook deliveries into the local
//! subscription state, and the outbound checkout/downgrade/portal actions.
//!
//! ## Features
//!
//! - **Webhooks**: signature verification, typed event payloads, and one
//!   handler per Polar event type
//! - **Status Mapping**: provider status strings → the three-state local
//!   model
//! - **Immediate-Cancellation Detection**: timestamp-proximity heuristic for
//!   "cancel now" vs "cancel at period end"
//! - **Event Deduplication**: suppresses duplicate and racing deliveries
//! - **Profile Store**: typed partial updates on `user_profiles`
//! - **Checkout / Downgrades / Portal**: the outbound Polar actions

pub mod cancellation;
pub mod checkout;
pub mod client;
pub mod dedup;
pub mod error;
pub mod events;
pub mod portal;
pub mod profiles;
pub mod status;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing;

// Cancellation
pub use cancellation::{is_immediate_cancellation, IMMEDIATE_CANCEL_WINDOW_MS};

// Checkout
pub use checkout::{CheckoutOutcome, CheckoutService};

// Client
pub use client::{
    CreateCheckout, PolarCheckout, PolarClient, PolarConfig, PolarOrder, PolarSubscription,
    SubscriptionUpdate,
};

// Dedup
pub use dedup::EventDedupCache;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{PaymentFailedPayload, WebhookEvent};

// Portal
pub use portal::PortalService;

// Profiles
pub use profiles::{Patch, PgProfileStore, ProfilePatch, ProfileStore};

// Status
pub use status::map_status;

// Subscriptions
pub use subscriptions::{ScheduledDowngrade, SubscriptionService};

// Webhooks
pub use webhooks::{verify_webhook_signature, WebhookHandler};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub profiles: Arc<dyn ProfileStore>,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Ok(Self::new(PolarConfig::from_env()?, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: PolarConfig, pool: PgPool) -> Self {
        let polar = PolarClient::new(config.clone());
        let store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(pool));
        let dedup = Arc::new(EventDedupCache::new());

        Self {
            checkout: CheckoutService::new(polar.clone(), store.clone()),
            portal: PortalService::new(polar.clone(), store.clone()),
            profiles: store.clone(),
            subscriptions: SubscriptionService::new(polar, store.clone()),
            webhooks: WebhookHandler::new(store, dedup, config.webhook_secret),
        }
    }
}
