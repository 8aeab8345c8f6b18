//! Webhook endpoints
//!
//! Both endpoints verify a signature over the raw body before any parsing
//! or dispatch. Unhandled event types are acknowledged with 200 so the
//! providers stop redelivering them; processing failures return 500, which
//! is the redelivery signal.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use launchkit_billing::{BillingError, ProfileStore, WebhookEvent};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/webhooks/polar
pub async fn polar_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("polar-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing signature header".to_string()))?;

    if !state.billing.webhooks.verify_signature(&body, signature) {
        tracing::warn!("Invalid Polar webhook signature");
        return Err(BillingError::WebhookSignatureInvalid.into());
    }

    let payload = std::str::from_utf8(&body)
        .map_err(|_| ApiError::BadRequest("body is not valid UTF-8".to_string()))?;

    match WebhookEvent::parse(payload) {
        Ok(Some(event)) => {
            tracing::info!(event_type = %event.kind(), "Processing Polar webhook event");
            state.billing.webhooks.handle_event(event).await?;
        }
        // Unhandled type: logged inside parse, acknowledged here.
        Ok(None) => {}
        Err(BillingError::InvalidPayload(msg)) => {
            tracing::warn!(error = %msg, "Malformed Polar webhook payload");
            return Err(ApiError::BadRequest(msg));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(json!({ "success": true })))
}

/// Clerk webhook envelope. Only the user id is consumed.
#[derive(Debug, Deserialize)]
struct ClerkEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: ClerkEventData,
}

#[derive(Debug, Deserialize)]
struct ClerkEventData {
    id: String,
}

/// POST /api/webhooks/clerk
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());
    let (Some(msg_id), Some(timestamp), Some(signature)) = (
        header("svix-id"),
        header("svix-timestamp"),
        header("svix-signature"),
    ) else {
        return Err(ApiError::BadRequest("missing required headers".to_string()));
    };

    if !state
        .clerk_webhooks
        .verify(msg_id, timestamp, signature, &body)
    {
        tracing::warn!("Invalid Clerk webhook signature");
        return Err(ApiError::BadRequest("invalid signature".to_string()));
    }

    let event: ClerkEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON payload: {e}")))?;
    let clerk_user_id = event.data.id;

    match event.event_type.as_str() {
        "user.created" => match state.billing.profiles.create(&clerk_user_id).await {
            Ok(_) => {
                tracing::info!(clerk_user_id = %clerk_user_id, "Default profile created");
            }
            // Redelivery or a lazily created row; not an error.
            Err(BillingError::ProfileAlreadyExists(_)) => {
                tracing::info!(clerk_user_id = %clerk_user_id, "Profile already exists, skipping");
            }
            Err(e) => return Err(e.into()),
        },
        "user.updated" => {
            state.billing.profiles.get_or_create(&clerk_user_id).await?;
            tracing::info!(clerk_user_id = %clerk_user_id, "Profile activity refreshed");
        }
        // Rows are kept to preserve billing history.
        "user.deleted" => {
            tracing::info!(clerk_user_id = %clerk_user_id, "User deleted, profile retained");
        }
        other => {
            tracing::info!(event_type = %other, "Unhandled Clerk webhook event type");
        }
    }

    Ok(Json(json!({ "success": true })))
}
