//! Typed webhook events
//!
//! Polar delivers `{ "type": "...", "data": { ... } }` envelopes. Payloads
//! are validated into one struct per event kind at this boundary; a known
//! type with a malformed body is rejected, an unknown type is surfaced as
//! `None` for the caller to log and acknowledge.

use serde::Deserialize;

use crate::client::{PolarCheckout, PolarOrder, PolarSubscription};
use crate::error::{BillingError, BillingResult};

/// Raw webhook envelope, before payload validation.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

/// A validated webhook event.
#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(PolarCheckout),
    SubscriptionCreated(PolarSubscription),
    SubscriptionUpdated(PolarSubscription),
    SubscriptionCanceled(PolarSubscription),
    OrderPaid(PolarOrder),
    PaymentFailed(PaymentFailedPayload),
}

/// Generic payment-failure notice. No distinction is made between transient
/// and permanent failures.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailedPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl PaymentFailedPayload {
    pub fn clerk_user_id(&self) -> Option<&str> {
        self.metadata.get("clerk_user_id").map(String::as_str)
    }
}

impl WebhookEvent {
    /// Parse a raw body. `Ok(None)` means the event type is not handled;
    /// `Err` means the body or a known type's payload is malformed.
    pub fn parse(body: &str) -> BillingResult<Option<Self>> {
        let envelope: WebhookEnvelope = serde_json::from_str(body)
            .map_err(|e| BillingError::InvalidPayload(format!("invalid JSON envelope: {e}")))?;

        let data = envelope.data;
        let event = match envelope.event_type.as_str() {
            "checkout.completed" => Self::CheckoutCompleted(decode(&envelope.event_type, data)?),
            "subscription.created" => {
                Self::SubscriptionCreated(decode(&envelope.event_type, data)?)
            }
            "subscription.updated" => {
                Self::SubscriptionUpdated(decode(&envelope.event_type, data)?)
            }
            "subscription.canceled" | "subscription.cancelled" => {
                Self::SubscriptionCanceled(decode(&envelope.event_type, data)?)
            }
            "order.paid" => Self::OrderPaid(decode(&envelope.event_type, data)?),
            "payment.failed" => Self::PaymentFailed(decode(&envelope.event_type, data)?),
            other => {
                tracing::info!(event_type = %other, "Unhandled Polar webhook event type");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }

    /// Event type string as delivered on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.completed",
            Self::SubscriptionCreated(_) => "subscription.created",
            Self::SubscriptionUpdated(_) => "subscription.updated",
            Self::SubscriptionCanceled(_) => "subscription.canceled",
            Self::OrderPaid(_) => "order.paid",
            Self::PaymentFailed(_) => "payment.failed",
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    event_type: &str,
    data: serde_json::Value,
) -> BillingResult<T> {
    serde_json::from_value(data)
        .map_err(|e| BillingError::InvalidPayload(format!("{event_type}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscription_updated() {
        let body = serde_json::json!({
            "type": "subscription.updated",
            "data": {
                "id": "74feb1a3-2d30-41aa-b106-6b841b611cb6",
                "status": "canceled",
                "cancel_at_period_end": false,
                "canceled_at": "2025-07-21T09:36:10.260Z",
                "ends_at": "2025-07-21T09:36:10.260Z",
                "current_period_end": "2025-08-21T09:33:38.000Z",
                "customer_id": "cus_1",
                "metadata": { "clerk_user_id": "user_3086xRRBAJLroUYxctPm1iG7kPC" }
            }
        })
        .to_string();

        let event = WebhookEvent::parse(&body).unwrap().unwrap();
        match event {
            WebhookEvent::SubscriptionUpdated(sub) => {
                assert_eq!(sub.status, "canceled");
                assert_eq!(
                    sub.clerk_user_id(),
                    Some("user_3086xRRBAJLroUYxctPm1iG7kPC")
                );
                assert!(sub.canceled_at.is_some());
            }
            other => panic!("expected subscription.updated, got {other:?}"),
        }
    }

    #[test]
    fn accepts_british_spelling_of_canceled() {
        let body = serde_json::json!({
            "type": "subscription.cancelled",
            "data": { "id": "sub_1", "status": "canceled" }
        })
        .to_string();

        let event = WebhookEvent::parse(&body).unwrap().unwrap();
        assert_eq!(event.kind(), "subscription.canceled");
    }

    #[test]
    fn unknown_type_is_ignored_not_an_error() {
        let body = r#"{"type": "benefit.granted", "data": {"id": "b_1"}}"#;
        assert!(WebhookEvent::parse(body).unwrap().is_none());
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        assert!(matches!(
            WebhookEvent::parse("not json"),
            Err(BillingError::InvalidPayload(_))
        ));
    }

    #[test]
    fn known_type_with_malformed_data_is_rejected() {
        // subscription payloads require id and status
        let body = r#"{"type": "subscription.updated", "data": {"status": 42}}"#;
        assert!(matches!(
            WebhookEvent::parse(body),
            Err(BillingError::InvalidPayload(_))
        ));
    }

    #[test]
    fn order_paid_carries_embedded_subscription() {
        let body = serde_json::json!({
            "type": "order.paid",
            "data": {
                "id": "ord_1",
                "customer_id": "cus_1",
                "metadata": { "clerk_user_id": "user_1" },
                "subscription": {
                    "id": "sub_real",
                    "status": "active",
                    "cancel_at_period_end": false,
                    "current_period_end": "2026-09-01T00:00:00Z"
                }
            }
        })
        .to_string();

        let event = WebhookEvent::parse(&body).unwrap().unwrap();
        match event {
            WebhookEvent::OrderPaid(order) => {
                assert_eq!(order.clerk_user_id(), Some("user_1"));
                assert_eq!(order.subscription.unwrap().id, "sub_real");
            }
            other => panic!("expected order.paid, got {other:?}"),
        }
    }
}
