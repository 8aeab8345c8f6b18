//! API error envelope

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use launchkit_billing::BillingError;
use serde_json::json;

/// Errors surfaced to HTTP clients.
///
/// Every variant renders the same JSON envelope
/// `{ "success": false, "error": "<message>" }` with the matching status
/// code, so callers have one shape to handle.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized, please sign in")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            // Validation failures the caller can act on.
            BillingError::InvalidPlan(_)
            | BillingError::InvalidPayload(_)
            | BillingError::AlreadyOnPlan(_)
            | BillingError::DowngradeAlreadyScheduled
            | BillingError::NoScheduledDowngrade => Self::BadRequest(err.to_string()),

            BillingError::NoActiveSubscription | BillingError::NoBillingCustomer => {
                Self::BadRequest(err.to_string())
            }

            BillingError::ProfileNotFound(_) => Self::NotFound(err.to_string()),

            BillingError::WebhookSignatureInvalid => Self::BadRequest(err.to_string()),

            // Provider message is preserved; the failure itself is ours to
            // report as a server error.
            BillingError::Provider { .. }
            | BillingError::Database(_)
            | BillingError::Http(_)
            | BillingError::Config(_)
            | BillingError::ProfileAlreadyExists(_) => Self::Internal(err.to_string()),
        }
    }
}
