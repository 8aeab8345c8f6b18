//! Billing error types

use launchkit_shared::SubscriptionPlan;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing crate.
///
/// Variants map onto the API layer's taxonomy: validation and not-found
/// variants become 4xx responses, provider and database failures become 5xx.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Polar returned a non-success status. The provider message is
    /// preserved so callers can surface it.
    #[error("polar api error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("profile already exists for user {0}")]
    ProfileAlreadyExists(String),

    #[error("no profile found for user {0}")]
    ProfileNotFound(String),

    #[error("invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("invalid plan \"{0}\", only \"pro\" is supported")]
    InvalidPlan(String),

    #[error("already subscribed to the {0} plan")]
    AlreadyOnPlan(SubscriptionPlan),

    #[error("no active paid subscription")]
    NoActiveSubscription,

    #[error("a downgrade is already scheduled")]
    DowngradeAlreadyScheduled,

    #[error("no downgrade is scheduled")]
    NoScheduledDowngrade,

    #[error("no billing customer exists for this user")]
    NoBillingCustomer,
}
