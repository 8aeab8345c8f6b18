//! Debug endpoints
//!
//! Mounted only when `ENABLE_DEBUG_ROUTES` is set. `reset-user` restores
//! free-tier defaults; `subscription` returns the local row next to the
//! provider's authoritative state so drift can be inspected directly.

use axum::extract::State;
use axum::{Extension, Json};
use launchkit_billing::{PolarSubscription, ProfileStore};
use launchkit_shared::UserProfile;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/debug/reset-user
pub async fn reset_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .billing
        .subscriptions
        .reset_profile(&auth_user.user_id)
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionSnapshot {
    pub profile: UserProfile,
    /// Live subscription state from Polar, absent when no subscription id
    /// is stored.
    pub provider: Option<PolarSubscription>,
}

/// GET /api/debug/subscription
pub async fn subscription_snapshot(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionSnapshot>, ApiError> {
    let profile = state
        .billing
        .profiles
        .get_or_create(&auth_user.user_id)
        .await?;
    let provider = state
        .billing
        .subscriptions
        .provider_snapshot(&auth_user.user_id)
        .await?;

    Ok(Json(SubscriptionSnapshot { profile, provider }))
}
