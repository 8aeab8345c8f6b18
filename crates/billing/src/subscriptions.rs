//! Subscription management
//!
//! Schedule/cancel period-end downgrades and reconciliation helpers. Each
//! operation calls Polar first and writes the local row second; if the local
//! write fails the state drifts until the next webhook converges it.

use std::sync::Arc;

use launchkit_shared::{SubscriptionPlan, SubscriptionStatus, UserProfile};
use time::OffsetDateTime;

use crate::client::{PolarClient, PolarSubscription, SubscriptionUpdate};
use crate::error::{BillingError, BillingResult};
use crate::profiles::{ProfilePatch, ProfileStore};

/// A scheduled period-end downgrade.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduledDowngrade {
    /// When the downgrade takes effect, if the provider reported it.
    pub effective_at: Option<OffsetDateTime>,
}

/// Subscription service for downgrade scheduling and state reconciliation.
pub struct SubscriptionService {
    polar: PolarClient,
    store: Arc<dyn ProfileStore>,
}

impl SubscriptionService {
    pub fn new(polar: PolarClient, store: Arc<dyn ProfileStore>) -> Self {
        Self { polar, store }
    }

    /// Schedule a downgrade to the free tier at period end.
    ///
    /// Requires an active paid subscription that is not already scheduled
    /// for cancellation. Plan and quota stay untouched; the user remains
    /// pro until the period expires.
    pub async fn schedule_downgrade(
        &self,
        clerk_user_id: &str,
    ) -> BillingResult<ScheduledDowngrade> {
        let profile = self.store.get_or_create(clerk_user_id).await?;
        let subscription_id = Self::paid_subscription_id(&profile)?;

        if profile.subscription_status == SubscriptionStatus::ActiveEnding {
            return Err(BillingError::DowngradeAlreadyScheduled);
        }

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            subscription_id = %subscription_id,
            "Scheduling downgrade at period end"
        );

        let updated = self
            .polar
            .update_subscription(
                &subscription_id,
                &SubscriptionUpdate::cancel_at_period_end(true),
            )
            .await?;

        self.store
            .update(
                clerk_user_id,
                ProfilePatch {
                    status: Some(SubscriptionStatus::ActiveEnding),
                    ..ProfilePatch::default()
                },
            )
            .await?;

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            effective_at = ?updated.current_period_end,
            "Downgrade scheduled"
        );

        Ok(ScheduledDowngrade {
            effective_at: updated.current_period_end,
        })
    }

    /// Cancel a previously scheduled downgrade, restoring normal renewal.
    pub async fn cancel_downgrade(&self, clerk_user_id: &str) -> BillingResult<()> {
        let profile = self.store.get_or_create(clerk_user_id).await?;
        let subscription_id = Self::paid_subscription_id(&profile)?;

        if profile.subscription_status != SubscriptionStatus::ActiveEnding {
            return Err(BillingError::NoScheduledDowngrade);
        }

        self.polar
            .update_subscription(
                &subscription_id,
                &SubscriptionUpdate::cancel_at_period_end(false),
            )
            .await?;

        self.store
            .update(
                clerk_user_id,
                ProfilePatch {
                    status: Some(SubscriptionStatus::ActiveRecurring),
                    ..ProfilePatch::default()
                },
            )
            .await?;

        tracing::info!(clerk_user_id = %clerk_user_id, "Downgrade cancelled, renewal restored");
        Ok(())
    }

    /// Fetch the authoritative subscription state from Polar for the user's
    /// stored subscription id. Debugging aid for reconciling drifted rows.
    pub async fn provider_snapshot(
        &self,
        clerk_user_id: &str,
    ) -> BillingResult<Option<PolarSubscription>> {
        let profile = self.store.get_or_create(clerk_user_id).await?;

        let Some(subscription_id) = profile
            .polar_subscription_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        Ok(Some(self.polar.get_subscription(subscription_id).await?))
    }

    /// Restore free-tier defaults and clear every billing field. Debug
    /// tooling only; this is the one path besides immediate cancellation
    /// that clears the customer id.
    pub async fn reset_profile(&self, clerk_user_id: &str) -> BillingResult<UserProfile> {
        self.store.get_or_create(clerk_user_id).await?;
        let profile = self
            .store
            .update(clerk_user_id, ProfilePatch::full_reset())
            .await?;
        tracing::info!(clerk_user_id = %clerk_user_id, "Profile reset to defaults");
        Ok(profile)
    }

    fn paid_subscription_id(profile: &UserProfile) -> BillingResult<String> {
        let has_paid_plan = profile.subscription_plan == Some(SubscriptionPlan::Pro);
        match profile.polar_subscription_id.as_deref() {
            Some(id) if !id.is_empty() && has_paid_plan => Ok(id.to_string()),
            _ => Err(BillingError::NoActiveSubscription),
        }
    }
}
