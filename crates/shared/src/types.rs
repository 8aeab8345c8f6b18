//! Common types used across Launchkit

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Monthly usage quota for profiles without a paid plan.
pub const FREE_MONTHLY_USAGE_LIMIT: i32 = 1_000;

/// Monthly usage quota for the pro plan.
pub const PRO_MONTHLY_USAGE_LIMIT: i32 = 10_000;

/// Paid subscription plan.
///
/// There is exactly one paid tier; "no paid plan" is represented as
/// `Option<SubscriptionPlan>::None` and stored as NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Pro,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "pro",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local subscription status.
///
/// Exactly one of these holds per profile at any time:
/// - `ActiveRecurring`: paid and will renew at `current_period_end`
/// - `ActiveEnding`: paid, cancellation scheduled; usable until
///   `current_period_end`
/// - `Inactive`: no paid access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    ActiveRecurring,
    ActiveEnding,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveRecurring => "active_recurring",
            Self::ActiveEnding => "active_ending",
            Self::Inactive => "inactive",
        }
    }

    /// Whether paid access is currently granted.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::ActiveRecurring | Self::ActiveEnding)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage limit dictated by a plan. No other value is valid for a profile.
pub fn usage_limit_for(plan: Option<SubscriptionPlan>) -> i32 {
    match plan {
        Some(SubscriptionPlan::Pro) => PRO_MONTHLY_USAGE_LIMIT,
        None => FREE_MONTHLY_USAGE_LIMIT,
    }
}

/// One row per Clerk user in `user_profiles`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub clerk_user_id: String,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_status: SubscriptionStatus,
    pub monthly_usage_limit: i32,
    /// Legacy column; no trial flow exists, always NULL.
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_active_date: Option<OffsetDateTime>,
    pub polar_customer_id: Option<String>,
    pub polar_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserProfile {
    /// Whether this profile has a paid subscription that is still renewing.
    ///
    /// A non-empty subscription id is required: checkout completion can leave
    /// an empty-string placeholder until `order.paid` backfills the real id.
    pub fn has_active_paid_subscription(&self) -> bool {
        self.subscription_plan.is_some()
            && self.subscription_status == SubscriptionStatus::ActiveRecurring
            && self
                .polar_subscription_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }
}
