//! Provider status mapping
//!
//! Single source of truth for translating a raw Polar subscription status
//! plus the cancel-at-period-end flag into the local three-state model.

use launchkit_shared::SubscriptionStatus;

/// Map a provider status string to the local subscription status.
///
/// Total and deterministic. Priority order:
/// 1. `active` + not canceling → `ActiveRecurring`
/// 2. `active` + cancel scheduled → `ActiveEnding`
/// 3. `incomplete` / `trialing` → `ActiveRecurring` (provisionally active)
/// 4. terminal statuses → `Inactive`
/// 5. anything unrecognized → `Inactive` (never grant paid access on an
///    unknown status)
pub fn map_status(provider_status: &str, cancel_at_period_end: bool) -> SubscriptionStatus {
    match provider_status {
        "active" if !cancel_at_period_end => SubscriptionStatus::ActiveRecurring,
        "active" => SubscriptionStatus::ActiveEnding,
        "incomplete" | "trialing" => SubscriptionStatus::ActiveRecurring,
        "canceled" | "cancelled" | "incomplete_expired" | "unpaid" | "past_due" => {
            SubscriptionStatus::Inactive
        }
        _ => SubscriptionStatus::Inactive,
    }
}
