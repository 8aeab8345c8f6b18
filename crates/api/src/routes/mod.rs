//! Route definitions

pub mod billing;
pub mod debug;
pub mod profile;
pub mod webhooks;

use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;

use crate::auth::require_auth;
use crate::state::AppState;

/// Build the application router.
///
/// Webhook endpoints authenticate via signatures on the raw body and stay
/// outside the session-auth layer; everything else requires a Clerk session
/// token. Debug routes are mounted only when explicitly enabled.
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/api/webhooks/polar", post(webhooks::polar_webhook))
        .route("/api/webhooks/clerk", post(webhooks::clerk_webhook));

    let mut authenticated = Router::new()
        .route("/api/user/subscription", get(profile::get_subscription))
        .route("/api/polar/create-checkout", post(billing::create_checkout))
        .route(
            "/api/polar/schedule-downgrade",
            post(billing::schedule_downgrade),
        )
        .route(
            "/api/polar/cancel-downgrade",
            post(billing::cancel_downgrade),
        )
        .route("/api/polar/customer-portal", post(billing::customer_portal));

    if state.config.enable_debug_routes {
        tracing::warn!("Debug routes enabled");
        authenticated = authenticated
            .route("/api/debug/reset-user", post(debug::reset_user))
            .route("/api/debug/subscription", get(debug::subscription_snapshot));
    }

    let authenticated =
        authenticated.layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(webhook_routes)
        .merge(authenticated)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
