#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Launchkit Shared
//!
//! Domain types and database plumbing shared by the API server and the
//! billing crate: subscription plan/status enums, the `user_profiles` row
//! type, usage-limit constants, and pool/migration helpers.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{
    usage_limit_for, SubscriptionPlan, SubscriptionStatus, UserProfile, FREE_MONTHLY_USAGE_LIMIT,
    PRO_MONTHLY_USAGE_LIMIT,
};
