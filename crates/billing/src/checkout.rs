//! Checkout and plan-change flow
//!
//! Decides between a fresh checkout session (no live subscription) and an
//! in-place subscription update (already paying; issuing a second checkout
//! would double-bill). The remote call happens first; the profile converges
//! via webhooks.

use std::collections::HashMap;
use std::sync::Arc;

use launchkit_shared::SubscriptionPlan;

use crate::client::{CreateCheckout, PolarClient, SubscriptionUpdate};
use crate::error::{BillingError, BillingResult};
use crate::profiles::ProfileStore;

/// Result of a plan-change request. The caller branches on which variant
/// came back: a redirect to the provider's checkout page, or a completed
/// in-place update.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Redirect {
        checkout_url: String,
        session_id: String,
    },
    Updated {
        subscription_id: String,
        plan: SubscriptionPlan,
    },
}

/// Checkout service for subscription upgrades.
pub struct CheckoutService {
    polar: PolarClient,
    store: Arc<dyn ProfileStore>,
}

impl CheckoutService {
    pub fn new(polar: PolarClient, store: Arc<dyn ProfileStore>) -> Self {
        Self { polar, store }
    }

    /// Upgrade a user to a paid plan.
    ///
    /// Already on the requested plan → `AlreadyOnPlan`. A live subscription
    /// (whatever the recorded plan says; the row may be mid-reconciliation)
    /// is switched in place with an immediate proration invoice. Otherwise a
    /// checkout session is created carrying the Clerk user id in metadata so
    /// the webhook handlers can attribute the resulting events.
    pub async fn upgrade_to_plan(
        &self,
        clerk_user_id: &str,
        plan: SubscriptionPlan,
        email: &str,
        success_url: Option<String>,
    ) -> BillingResult<CheckoutOutcome> {
        let profile = self.store.get_or_create(clerk_user_id).await?;

        if profile.subscription_plan == Some(plan) {
            return Err(BillingError::AlreadyOnPlan(plan));
        }

        let live_subscription_id = profile
            .polar_subscription_id
            .as_deref()
            .filter(|id| !id.is_empty() && profile.subscription_status.is_active())
            .map(str::to_string);

        if let Some(subscription_id) = live_subscription_id {
            return self.switch_plan_in_place(clerk_user_id, &subscription_id, plan).await;
        }

        self.create_new_checkout(clerk_user_id, &profile, plan, email, success_url)
            .await
    }

    async fn switch_plan_in_place(
        &self,
        clerk_user_id: &str,
        subscription_id: &str,
        plan: SubscriptionPlan,
    ) -> BillingResult<CheckoutOutcome> {
        let product_id = self.product_id_for(plan);

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            subscription_id = %subscription_id,
            plan = %plan,
            "Switching existing subscription in place"
        );

        let updated = self
            .polar
            .update_subscription(subscription_id, &SubscriptionUpdate::switch_product(product_id))
            .await?;

        tracing::info!(
            subscription_id = %updated.id,
            status = %updated.status,
            "Subscription product updated"
        );

        Ok(CheckoutOutcome::Updated {
            subscription_id: updated.id,
            plan,
        })
    }

    async fn create_new_checkout(
        &self,
        clerk_user_id: &str,
        profile: &launchkit_shared::UserProfile,
        plan: SubscriptionPlan,
        email: &str,
        success_url: Option<String>,
    ) -> BillingResult<CheckoutOutcome> {
        let upgrade_from = profile
            .subscription_plan
            .map(|p| p.as_str())
            .unwrap_or("free");

        let request = CreateCheckout {
            products: vec![self.product_id_for(plan)],
            success_url: success_url
                .unwrap_or_else(|| self.polar.config().checkout_success_url()),
            customer_email: Some(email.to_string()),
            external_customer_id: Some(clerk_user_id.to_string()),
            metadata: HashMap::from([
                ("clerk_user_id".to_string(), clerk_user_id.to_string()),
                ("subscription_plan".to_string(), plan.as_str().to_string()),
                ("upgrade_from".to_string(), upgrade_from.to_string()),
            ]),
        };

        let checkout = self.polar.create_checkout(&request).await?;
        let checkout_url = checkout.url.ok_or(BillingError::Provider {
            status: 502,
            message: "checkout session has no URL".to_string(),
        })?;

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            session_id = %checkout.id,
            "Checkout session created"
        );

        Ok(CheckoutOutcome::Redirect {
            checkout_url,
            session_id: checkout.id,
        })
    }

    fn product_id_for(&self, plan: SubscriptionPlan) -> String {
        match plan {
            SubscriptionPlan::Pro => self.polar.config().pro_product_id.clone(),
        }
    }
}
