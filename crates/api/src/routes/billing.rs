//! Billing action endpoints
//!
//! Browser-facing JSON endpoints wrapping the outbound Polar operations.
//! Request/response bodies use camelCase to match the web client. Each
//! endpoint authorizes the caller against the target user id before touching
//! the store or the provider.

use axum::extract::State;
use axum::{Extension, Json};
use launchkit_shared::SubscriptionPlan;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use crate::auth::{ensure_self, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Request to upgrade/switch the subscription plan.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub plan: String,
    pub user_id: String,
    pub success_url: Option<String>,
}

/// Response: either a checkout redirect or a completed in-place update.
/// The caller branches on which field is populated.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_plan: Option<SubscriptionPlan>,
}

/// POST /api/polar/create-checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutActionResponse>, ApiError> {
    let plan = SubscriptionPlan::from_str(&req.plan)
        .ok_or_else(|| launchkit_billing::BillingError::InvalidPlan(req.plan.clone()))?;
    ensure_self(&auth_user, &req.user_id)?;

    let user = state
        .clerk
        .get_user(&auth_user.user_id)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to look up user: {e}")))?;
    let email = user.primary_email().ok_or_else(|| {
        ApiError::BadRequest("no email address on account, verify your email first".to_string())
    })?;

    let outcome = state
        .billing
        .checkout
        .upgrade_to_plan(&auth_user.user_id, plan, email, req.success_url)
        .await?;

    let response = match outcome {
        launchkit_billing::CheckoutOutcome::Redirect {
            checkout_url,
            session_id,
        } => CheckoutActionResponse {
            success: true,
            checkout_url: Some(checkout_url),
            session_id: Some(session_id),
            message: None,
            new_plan: None,
        },
        launchkit_billing::CheckoutOutcome::Updated {
            subscription_id, ..
        } => {
            tracing::info!(
                clerk_user_id = %auth_user.user_id,
                subscription_id = %subscription_id,
                "Subscription switched in place"
            );
            CheckoutActionResponse {
                success: true,
                checkout_url: None,
                session_id: None,
                message: Some("subscription updated".to_string()),
                new_plan: Some(plan),
            }
        }
    };

    Ok(Json(response))
}

/// Request to schedule a downgrade at period end.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDowngradeRequest {
    pub target_plan: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDowngradeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
}

/// POST /api/polar/schedule-downgrade
pub async fn schedule_downgrade(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ScheduleDowngradeRequest>,
) -> Result<Json<ScheduleDowngradeResponse>, ApiError> {
    if req.target_plan != "free" {
        return Err(ApiError::BadRequest(
            "invalid target plan, only \"free\" is supported".to_string(),
        ));
    }
    ensure_self(&auth_user, &req.user_id)?;

    let scheduled = state
        .billing
        .subscriptions
        .schedule_downgrade(&auth_user.user_id)
        .await?;

    let effective_date = scheduled
        .effective_at
        .and_then(|at| at.format(&Rfc3339).ok());

    Ok(Json(ScheduleDowngradeResponse {
        success: true,
        message: "cancellation scheduled, effective at the end of the current billing period"
            .to_string(),
        effective_date,
    }))
}

#[derive(Debug, Serialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/polar/cancel-downgrade
pub async fn cancel_downgrade(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SimpleResponse>, ApiError> {
    state
        .billing
        .subscriptions
        .cancel_downgrade(&auth_user.user_id)
        .await?;

    Ok(Json(SimpleResponse {
        success: true,
        message: "downgrade cancelled, your subscription will renew normally".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// POST /api/polar/customer-portal
pub async fn customer_portal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<PortalResponse>, ApiError> {
    let url = state.billing.portal.portal_url(&auth_user.user_id).await?;
    Ok(Json(PortalResponse { url }))
}
