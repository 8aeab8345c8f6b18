//! Immediate-cancellation detection
//!
//! Polar delivers "cancel now" and "cancel at period end" through the same
//! `subscription.updated` / `subscription.canceled` events, both of which can
//! show `status == "canceled"`. The distinguishing signal is timestamp
//! proximity: an immediate cancellation sets `ends_at` to roughly
//! `canceled_at`, while a scheduled one sets it to the far-future period end.

use crate::client::PolarSubscription;

/// Maximum gap between `canceled_at` and `ends_at` for a cancellation to
/// count as immediate. A heuristic threshold, not a provider contract;
/// tune here if Polar's timing characteristics change.
pub const IMMEDIATE_CANCEL_WINDOW_MS: i64 = 60_000;

/// Whether a subscription payload describes a cancel-effective-immediately.
///
/// Returns `false` for anything other than `status == "canceled"`, for
/// explicitly scheduled cancellations, and whenever either timestamp is
/// missing.
pub fn is_immediate_cancellation(subscription: &PolarSubscription) -> bool {
    if subscription.status != "canceled" {
        return false;
    }
    if subscription.cancel_at_period_end {
        return false;
    }

    let (Some(canceled_at), Some(ends_at)) = (subscription.canceled_at, subscription.ends_at)
    else {
        return false;
    };

    let gap_ms = (ends_at - canceled_at).whole_milliseconds().abs();
    gap_ms < IMMEDIATE_CANCEL_WINDOW_MS as i128
}
