//! Polar webhook handling
//!
//! Signature verification, event dispatch, and one handler per event type.
//! Handlers reconcile out-of-order, duplicate, and ambiguous deliveries into
//! the three-state subscription model on the profile row. Business-rule
//! rejections (missing metadata, unresolvable users, duplicate deliveries)
//! are logged and swallowed; only infrastructure failures propagate, which
//! signals the provider to redeliver.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use launchkit_shared::SubscriptionStatus;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::cancellation::is_immediate_cancellation;
use crate::client::{PolarCheckout, PolarOrder, PolarSubscription};
use crate::dedup::EventDedupCache;
use crate::error::BillingResult;
use crate::events::{PaymentFailedPayload, WebhookEvent};
use crate::profiles::{Patch, ProfilePatch, ProfileStore};
use crate::status::map_status;

type HmacSha256 = Hmac<Sha256>;

/// Verify a Polar webhook signature: HMAC-SHA256 hex digest over the raw
/// body, compared in constant time. A `sha256=` prefix on the supplied
/// signature is stripped before comparison.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let provided = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    provided.ct_eq(expected.as_slice()).into()
}

/// Webhook handler for Polar events.
pub struct WebhookHandler {
    store: Arc<dyn ProfileStore>,
    dedup: Arc<EventDedupCache>,
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        dedup: Arc<EventDedupCache>,
        webhook_secret: String,
    ) -> Self {
        Self {
            store,
            dedup,
            webhook_secret,
        }
    }

    /// Verify the raw request body against the `polar-signature` header.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_webhook_signature(&self.webhook_secret, payload, signature)
    }

    /// Drop every dedup key. Invoked on a fixed interval by the server's
    /// background task; growth mitigation, not a correctness mechanism.
    pub fn clear_dedup_cache(&self) {
        self.dedup.clear();
    }

    /// Dispatch a verified, parsed event to its handler.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        match event {
            WebhookEvent::CheckoutCompleted(checkout) => {
                self.handle_checkout_completed(checkout).await
            }
            WebhookEvent::SubscriptionCreated(sub) => self.handle_subscription_created(sub).await,
            WebhookEvent::SubscriptionUpdated(sub) => self.handle_subscription_updated(sub).await,
            WebhookEvent::SubscriptionCanceled(sub) => {
                self.handle_subscription_canceled(sub).await
            }
            WebhookEvent::OrderPaid(order) => self.handle_order_paid(order).await,
            WebhookEvent::PaymentFailed(payload) => self.handle_payment_failed(payload).await,
        }
    }

    /// Checkout completed: grant pro access immediately. The subscription id
    /// is often not assigned yet at this point; an empty placeholder is
    /// stored and backfilled by `subscription.created` / `order.paid`.
    async fn handle_checkout_completed(&self, checkout: PolarCheckout) -> BillingResult<()> {
        let Some(clerk_user_id) = checkout.clerk_user_id().map(str::to_string) else {
            tracing::warn!(
                checkout_id = %checkout.id,
                "checkout.completed without clerk_user_id metadata, skipping"
            );
            return Ok(());
        };

        self.store.get_or_create(&clerk_user_id).await?;

        let mut patch = ProfilePatch::for_status(SubscriptionStatus::ActiveRecurring);
        if let Some(customer_id) = checkout.customer_id.clone() {
            patch.polar_customer_id = Patch::Set(customer_id);
        }
        patch.polar_subscription_id =
            Patch::Set(checkout.subscription_id.clone().unwrap_or_default());

        self.store.update(&clerk_user_id, patch).await?;

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            checkout_id = %checkout.id,
            subscription_id = ?checkout.subscription_id,
            "Checkout completed, profile upgraded"
        );
        Ok(())
    }

    /// Subscription created: full sync of the new subscription. Rejects the
    /// event when required fields are missing rather than writing a partial
    /// row.
    async fn handle_subscription_created(&self, sub: PolarSubscription) -> BillingResult<()> {
        let Some(clerk_user_id) = sub.clerk_user_id().map(str::to_string) else {
            tracing::warn!(
                subscription_id = %sub.id,
                "subscription.created without clerk_user_id metadata, skipping"
            );
            return Ok(());
        };

        if sub.status.is_empty() || sub.customer_id.is_none() || sub.current_period_end.is_none() {
            tracing::warn!(
                subscription_id = %sub.id,
                status = %sub.status,
                has_customer = sub.customer_id.is_some(),
                has_period_end = sub.current_period_end.is_some(),
                "subscription.created missing required fields, rejecting event"
            );
            return Ok(());
        }

        self.store.get_or_create(&clerk_user_id).await?;

        let status = map_status(&sub.status, sub.cancel_at_period_end);
        let patch = patch_for_subscription(status, &sub);
        self.store.update(&clerk_user_id, patch).await?;

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            subscription_id = %sub.id,
            status = %status,
            "Subscription created"
        );
        Ok(())
    }

    /// Subscription updated. The immediate-cancellation check runs first and
    /// short-circuits everything else, before the generic dedup key is even
    /// computed: the raw status/flags cannot describe "cancel right now".
    async fn handle_subscription_updated(&self, sub: PolarSubscription) -> BillingResult<()> {
        if is_immediate_cancellation(&sub) {
            return self
                .apply_immediate_cancellation("subscription.updated", &sub)
                .await;
        }

        let key = EventDedupCache::event_key("subscription.updated", &sub.id, sub.modified_at);
        if !self.dedup.claim(&key) {
            tracing::info!(key = %key, "Duplicate subscription.updated delivery, skipping");
            return Ok(());
        }

        let Some(clerk_user_id) = self.resolve_clerk_user(&sub).await? else {
            tracing::warn!(
                subscription_id = %sub.id,
                customer_id = ?sub.customer_id,
                "No user found for subscription.updated, skipping"
            );
            return Ok(());
        };

        let status = if matches!(sub.status.as_str(), "canceled" | "cancelled") {
            SubscriptionStatus::Inactive
        } else if sub.cancel_at_period_end && sub.status == "active" {
            SubscriptionStatus::ActiveEnding
        } else {
            map_status(&sub.status, sub.cancel_at_period_end)
        };

        let patch = patch_for_subscription(status, &sub);
        if !self.try_update(&clerk_user_id, patch, "subscription.updated").await? {
            return Ok(());
        }

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            subscription_id = %sub.id,
            status = %status,
            "Subscription updated"
        );
        Ok(())
    }

    /// Subscription canceled. A period-end cancellation keeps the user at
    /// full paid quota until expiry: status flips to `active_ending` and
    /// `current_period_end` is left untouched. The provider is expected to
    /// emit a later update that flips the row to `inactive`.
    async fn handle_subscription_canceled(&self, sub: PolarSubscription) -> BillingResult<()> {
        if is_immediate_cancellation(&sub) {
            return self
                .apply_immediate_cancellation("subscription.canceled", &sub)
                .await;
        }

        let key = EventDedupCache::event_key("subscription.canceled", &sub.id, sub.modified_at);
        if !self.dedup.claim(&key) {
            tracing::info!(key = %key, "Duplicate subscription.canceled delivery, skipping");
            return Ok(());
        }

        let Some(clerk_user_id) = self.resolve_clerk_user(&sub).await? else {
            tracing::warn!(
                subscription_id = %sub.id,
                customer_id = ?sub.customer_id,
                "No user found for subscription.canceled, skipping"
            );
            return Ok(());
        };

        let patch = ProfilePatch::for_status(SubscriptionStatus::ActiveEnding);
        if !self.try_update(&clerk_user_id, patch, "subscription.canceled").await? {
            return Ok(());
        }

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            subscription_id = %sub.id,
            "Cancellation scheduled, paid access retained until period end"
        );
        Ok(())
    }

    /// Order paid: recompute status from the embedded subscription. This is
    /// the authoritative place the subscription id gets backfilled when the
    /// checkout event left an empty placeholder.
    async fn handle_order_paid(&self, order: PolarOrder) -> BillingResult<()> {
        let Some(sub) = order.subscription.clone() else {
            tracing::warn!(
                order_id = %order.id,
                "order.paid without embedded subscription, skipping"
            );
            return Ok(());
        };

        let clerk_user_id = match order.clerk_user_id().map(str::to_string) {
            Some(id) => id,
            None => match self.resolve_clerk_user(&sub).await? {
                Some(id) => id,
                None => {
                    tracing::warn!(
                        order_id = %order.id,
                        customer_id = ?order.customer_id,
                        "No user found for order.paid, skipping"
                    );
                    return Ok(());
                }
            },
        };

        self.store.get_or_create(&clerk_user_id).await?;

        let status = map_status(&sub.status, sub.cancel_at_period_end);
        let patch = patch_for_subscription(status, &sub);
        self.store.update(&clerk_user_id, patch).await?;

        tracing::info!(
            clerk_user_id = %clerk_user_id,
            order_id = %order.id,
            subscription_id = %sub.id,
            status = %status,
            "Order paid, subscription state synced"
        );
        Ok(())
    }

    /// Payment failed: unconditional downgrade to inactive. No distinction
    /// between transient and permanent failure.
    async fn handle_payment_failed(&self, payload: PaymentFailedPayload) -> BillingResult<()> {
        let clerk_user_id = match payload.clerk_user_id().map(str::to_string) {
            Some(id) => id,
            None => {
                let by_customer = match payload.customer_id.as_deref() {
                    Some(customer_id) => {
                        self.store.get_by_polar_customer_id(customer_id).await?
                    }
                    None => None,
                };
                match by_customer {
                    Some(profile) => profile.clerk_user_id,
                    None => {
                        tracing::warn!(
                            customer_id = ?payload.customer_id,
                            "No user found for payment.failed, skipping"
                        );
                        return Ok(());
                    }
                }
            }
        };

        let patch = ProfilePatch::for_status(SubscriptionStatus::Inactive);
        if !self.try_update(&clerk_user_id, patch, "payment.failed").await? {
            return Ok(());
        }

        tracing::warn!(clerk_user_id = %clerk_user_id, "Payment failed, profile downgraded");
        Ok(())
    }

    /// Forced downgrade for cancel-effective-immediately. Bypasses the
    /// status mapper and clears every billing field. The dedup key is
    /// derived from the subscription id alone so only the first of the
    /// {updated, canceled} pair describing this cancellation is applied.
    async fn apply_immediate_cancellation(
        &self,
        event_kind: &str,
        sub: &PolarSubscription,
    ) -> BillingResult<()> {
        if !self.dedup.claim_immediate_cancellation(&sub.id) {
            tracing::info!(
                event_kind = %event_kind,
                subscription_id = %sub.id,
                "Immediate cancellation already processed, skipping"
            );
            return Ok(());
        }

        let Some(clerk_user_id) = self.resolve_clerk_user(sub).await? else {
            tracing::warn!(
                event_kind = %event_kind,
                subscription_id = %sub.id,
                "No user found for immediate cancellation, skipping"
            );
            return Ok(());
        };

        if !self
            .try_update(&clerk_user_id, ProfilePatch::full_reset(), event_kind)
            .await?
        {
            return Ok(());
        }

        tracing::info!(
            event_kind = %event_kind,
            clerk_user_id = %clerk_user_id,
            subscription_id = %sub.id,
            "Immediate cancellation applied, profile reset to free tier"
        );
        Ok(())
    }

    /// Apply a patch, treating a missing profile as a logged skip rather
    /// than a failure. Returns whether the row was mutated.
    async fn try_update(
        &self,
        clerk_user_id: &str,
        patch: ProfilePatch,
        event_kind: &str,
    ) -> BillingResult<bool> {
        match self.store.update(clerk_user_id, patch).await {
            Ok(_) => Ok(true),
            Err(crate::error::BillingError::ProfileNotFound(_)) => {
                tracing::warn!(
                    clerk_user_id = %clerk_user_id,
                    event_kind = %event_kind,
                    "Event references a user without a profile, skipping"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the Clerk user: checkout metadata first, then the stored
    /// customer-id mapping for payloads that lack it.
    async fn resolve_clerk_user(&self, sub: &PolarSubscription) -> BillingResult<Option<String>> {
        if let Some(id) = sub.clerk_user_id() {
            return Ok(Some(id.to_string()));
        }
        if let Some(customer_id) = sub.customer_id.as_deref() {
            if let Some(profile) = self.store.get_by_polar_customer_id(customer_id).await? {
                return Ok(Some(profile.clerk_user_id));
            }
        }
        Ok(None)
    }
}

/// Build the profile patch for a mapped status. Active statuses carry the
/// subscription linkage forward; an ordinary deactivation drops the
/// subscription id and period end but keeps the customer id sticky.
fn patch_for_subscription(status: SubscriptionStatus, sub: &PolarSubscription) -> ProfilePatch {
    let mut patch = ProfilePatch::for_status(status);
    if status.is_active() {
        patch.polar_subscription_id = Patch::Set(sub.id.clone());
        if let Some(customer_id) = sub.customer_id.clone() {
            patch.polar_customer_id = Patch::Set(customer_id);
        }
        if let Some(period_end) = sub.current_period_end {
            patch.current_period_end = Patch::Set(period_end);
        }
    } else {
        patch.polar_subscription_id = Patch::Clear;
        patch.current_period_end = Patch::Clear;
    }
    patch
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MemoryProfileStore;
    use launchkit_shared::{SubscriptionPlan, UserProfile};
    use std::collections::HashMap;
    use time::{Duration, OffsetDateTime};

    const USER: &str = "user_3086xRRBAJLroUYxctPm1iG7kPC";
    const SECRET: &str = "whsec_launchkit_test";

    fn subscription(status: &str, cancel_at_period_end: bool) -> PolarSubscription {
        PolarSubscription {
            id: "sub_1".to_string(),
            status: status.to_string(),
            cancel_at_period_end,
            canceled_at: None,
            ends_at: None,
            ended_at: None,
            current_period_end: Some(OffsetDateTime::now_utc() + Duration::days(30)),
            modified_at: Some(OffsetDateTime::now_utc()),
            customer_id: Some("cus_1".to_string()),
            product_id: Some("prod_pro".to_string()),
            metadata: HashMap::from([("clerk_user_id".to_string(), USER.to_string())]),
        }
    }

    fn handler_with(store: Arc<MemoryProfileStore>) -> WebhookHandler {
        WebhookHandler::new(store, Arc::new(EventDedupCache::new()), SECRET.to_string())
    }

    async fn seeded_pro_store() -> (Arc<MemoryProfileStore>, OffsetDateTime) {
        let store = Arc::new(MemoryProfileStore::new());
        let period_end = OffsetDateTime::now_utc() + Duration::days(30);
        store
            .seed(USER, |profile| {
                profile.subscription_plan = Some(SubscriptionPlan::Pro);
                profile.subscription_status = SubscriptionStatus::ActiveRecurring;
                profile.monthly_usage_limit = 10_000;
                profile.polar_customer_id = Some("cus_1".to_string());
                profile.polar_subscription_id = Some("sub_1".to_string());
                profile.current_period_end = Some(period_end);
            })
            .await;
        (store, period_end)
    }

    /// The plan/status invariant every handler must uphold.
    fn assert_invariant(profile: &UserProfile) {
        match profile.subscription_status {
            SubscriptionStatus::Inactive => {
                assert!(profile.subscription_plan.is_none());
                assert_eq!(profile.monthly_usage_limit, 1_000);
            }
            _ => {
                assert_eq!(profile.subscription_plan, Some(SubscriptionPlan::Pro));
                assert_eq!(profile.monthly_usage_limit, 10_000);
            }
        }
    }

    // ------------------------------------------------------------------
    // Signature verification
    // ------------------------------------------------------------------

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"subscription.updated","data":{"id":"sub_1"}}"#;
        let signature = sign(SECRET, payload);
        assert!(verify_webhook_signature(SECRET, payload, &signature));
        // sha256= prefix is stripped before comparison
        assert!(verify_webhook_signature(
            SECRET,
            payload,
            &format!("sha256={signature}")
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let payload = br#"{"type":"subscription.updated","data":{"id":"sub_1"}}"#;
        let signature = sign(SECRET, payload);
        let tampered = br#"{"type":"subscription.updated","data":{"id":"sub_2"}}"#;
        assert!(!verify_webhook_signature(SECRET, tampered, &signature));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(!verify_webhook_signature(SECRET, b"payload", "not-hex"));
        assert!(!verify_webhook_signature(SECRET, b"payload", ""));
    }

    // ------------------------------------------------------------------
    // Scenario: period-end cancellation keeps paid access
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn period_end_cancellation_flips_to_active_ending() {
        let (store, period_end) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        let canceled_at = OffsetDateTime::now_utc();
        let mut sub = subscription("canceled", true);
        sub.canceled_at = Some(canceled_at);
        sub.ends_at = Some(period_end); // gap far beyond the immediate window

        handler
            .handle_event(WebhookEvent::SubscriptionCanceled(sub))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, Some(SubscriptionPlan::Pro));
        assert_eq!(profile.subscription_status, SubscriptionStatus::ActiveEnding);
        assert_eq!(profile.monthly_usage_limit, 10_000);
        assert_eq!(profile.current_period_end, Some(period_end));
        assert_invariant(&profile);
    }

    // ------------------------------------------------------------------
    // Scenario: immediate cancellation force-downgrades and dedups the pair
    // ------------------------------------------------------------------

    fn immediate_cancel_subscription() -> PolarSubscription {
        let canceled_at = OffsetDateTime::now_utc();
        let mut sub = subscription("canceled", false);
        sub.canceled_at = Some(canceled_at);
        sub.ends_at = Some(canceled_at + Duration::milliseconds(500));
        sub
    }

    #[tokio::test]
    async fn immediate_cancellation_resets_profile() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(
                immediate_cancel_subscription(),
            ))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, None);
        assert_eq!(profile.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(profile.monthly_usage_limit, 1_000);
        assert_eq!(profile.polar_subscription_id, None);
        assert_eq!(profile.polar_customer_id, None);
        assert_eq!(profile.current_period_end, None);
        assert_invariant(&profile);

        // The racing subscription.canceled for the same cancellation is a no-op.
        let updates_before = store.update_calls();
        handler
            .handle_event(WebhookEvent::SubscriptionCanceled(
                immediate_cancel_subscription(),
            ))
            .await
            .unwrap();
        assert_eq!(store.update_calls(), updates_before);

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    async fn duplicate_immediate_cancellation_mutates_once() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        for _ in 0..2 {
            handler
                .handle_event(WebhookEvent::SubscriptionUpdated(
                    immediate_cancel_subscription(),
                ))
                .await
                .unwrap();
        }

        assert_eq!(store.update_calls(), 1, "second delivery must be a no-op");
    }

    // ------------------------------------------------------------------
    // Scenario: checkout then order.paid backfills the subscription id
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn checkout_then_order_paid_backfills_subscription_id() {
        let store = Arc::new(MemoryProfileStore::new());
        let handler = handler_with(store.clone());

        let checkout = PolarCheckout {
            id: "co_1".to_string(),
            status: Some("succeeded".to_string()),
            url: None,
            customer_id: Some("cus_1".to_string()),
            customer_email: Some("user@example.com".to_string()),
            subscription_id: None,
            metadata: HashMap::from([("clerk_user_id".to_string(), USER.to_string())]),
        };
        handler
            .handle_event(WebhookEvent::CheckoutCompleted(checkout))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, Some(SubscriptionPlan::Pro));
        assert_eq!(
            profile.subscription_status,
            SubscriptionStatus::ActiveRecurring
        );
        // Tolerated empty-string placeholder until the real id arrives.
        assert_eq!(profile.polar_subscription_id.as_deref(), Some(""));
        assert_invariant(&profile);

        let mut real_sub = subscription("active", false);
        real_sub.id = "sub_real".to_string();
        let order = PolarOrder {
            id: "ord_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            subscription: Some(real_sub),
            metadata: HashMap::from([("clerk_user_id".to_string(), USER.to_string())]),
        };
        handler
            .handle_event(WebhookEvent::OrderPaid(order))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.polar_subscription_id.as_deref(), Some("sub_real"));
        assert_eq!(
            profile.subscription_status,
            SubscriptionStatus::ActiveRecurring
        );
        assert_invariant(&profile);
    }

    // ------------------------------------------------------------------
    // Remaining transitions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn subscription_created_syncs_full_state() {
        let store = Arc::new(MemoryProfileStore::new());
        let handler = handler_with(store.clone());

        let sub = subscription("active", false);
        let period_end = sub.current_period_end;
        handler
            .handle_event(WebhookEvent::SubscriptionCreated(sub))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, Some(SubscriptionPlan::Pro));
        assert_eq!(profile.polar_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(profile.polar_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(profile.current_period_end, period_end);
        assert_invariant(&profile);
    }

    #[tokio::test]
    async fn subscription_created_missing_fields_is_rejected() {
        let store = Arc::new(MemoryProfileStore::new());
        let handler = handler_with(store.clone());

        let mut sub = subscription("active", false);
        sub.current_period_end = None;
        handler
            .handle_event(WebhookEvent::SubscriptionCreated(sub))
            .await
            .unwrap();

        assert!(store.get_by_clerk_id(USER).await.unwrap().is_none());
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn scheduled_cancellation_via_update_becomes_active_ending() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        let sub = subscription("active", true);
        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(sub))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::ActiveEnding);
        assert_eq!(profile.subscription_plan, Some(SubscriptionPlan::Pro));
        assert_invariant(&profile);
    }

    #[tokio::test]
    async fn non_immediate_canceled_update_deactivates() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        // canceled status without timestamps: not classifiable as immediate,
        // still a terminal state.
        let sub = subscription("canceled", false);
        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(sub))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(profile.subscription_plan, None);
        assert_eq!(profile.polar_subscription_id, None);
        // customer id stays sticky on ordinary deactivation
        assert_eq!(profile.polar_customer_id.as_deref(), Some("cus_1"));
        assert_invariant(&profile);
    }

    #[tokio::test]
    async fn payment_failed_downgrades_unconditionally() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        let payload = PaymentFailedPayload {
            id: Some("pay_1".to_string()),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            metadata: HashMap::from([("clerk_user_id".to_string(), USER.to_string())]),
        };
        handler
            .handle_event(WebhookEvent::PaymentFailed(payload))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(profile.subscription_plan, None);
        assert_invariant(&profile);
    }

    #[tokio::test]
    async fn unresolvable_user_is_a_silent_skip() {
        let store = Arc::new(MemoryProfileStore::new());
        let handler = handler_with(store.clone());

        let mut sub = subscription("active", false);
        sub.metadata.clear();
        sub.customer_id = Some("cus_unknown".to_string());

        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(sub))
            .await
            .unwrap();
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn customer_id_fallback_resolves_user() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        let mut sub = subscription("active", true);
        sub.metadata.clear(); // payload without clerk_user_id metadata

        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(sub))
            .await
            .unwrap();

        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::ActiveEnding);
    }

    #[tokio::test]
    async fn dedup_cache_clear_allows_reprocessing() {
        let (store, _) = seeded_pro_store().await;
        let handler = handler_with(store.clone());

        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(
                immediate_cancel_subscription(),
            ))
            .await
            .unwrap();
        assert_eq!(store.update_calls(), 1);

        handler.clear_dedup_cache();

        handler
            .handle_event(WebhookEvent::SubscriptionUpdated(
                immediate_cancel_subscription(),
            ))
            .await
            .unwrap();
        // Hourly clear trades strict idempotency for bounded memory; the
        // second application converges to the same state.
        assert_eq!(store.update_calls(), 2);
        let profile = store.get_by_clerk_id(USER).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, SubscriptionStatus::Inactive);
    }
}
