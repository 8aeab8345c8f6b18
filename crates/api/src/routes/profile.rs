//! User profile endpoint

use axum::extract::State;
use axum::{Extension, Json};
use launchkit_billing::ProfileStore;
use launchkit_shared::UserProfile;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/user/subscription
///
/// Returns the caller's profile row, creating it lazily with free-tier
/// defaults on first access.
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .billing
        .profiles
        .get_or_create(&auth_user.user_id)
        .await?;
    Ok(Json(profile))
}
