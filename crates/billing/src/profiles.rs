//! User profile store
//!
//! Typed read/upsert operations against `user_profiles`, keyed by the Clerk
//! user id. The storage seam is a trait so webhook handlers can be exercised
//! against an in-memory store in tests.

use async_trait::async_trait;
use launchkit_shared::{
    usage_limit_for, SubscriptionPlan, SubscriptionStatus, UserProfile,
    FREE_MONTHLY_USAGE_LIMIT,
};
use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

/// Partial-update field: leave unchanged, write a value, or clear to NULL.
///
/// Omission never clears: handlers that need to null a column say so
/// explicitly with `Clear`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

/// Partial update for a profile row. Defaults to changing nothing.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub plan: Patch<SubscriptionPlan>,
    pub status: Option<SubscriptionStatus>,
    pub monthly_usage_limit: Option<i32>,
    pub polar_customer_id: Patch<String>,
    pub polar_subscription_id: Patch<String>,
    pub current_period_end: Patch<OffsetDateTime>,
    pub trial_ends_at: Patch<OffsetDateTime>,
    pub last_active_date: Option<OffsetDateTime>,
}

impl ProfilePatch {
    /// Free-tier defaults with every billing field cleared. Used by the
    /// forced downgrade on immediate cancellation and the debug reset.
    pub fn full_reset() -> Self {
        Self {
            plan: Patch::Clear,
            status: Some(SubscriptionStatus::Inactive),
            monthly_usage_limit: Some(FREE_MONTHLY_USAGE_LIMIT),
            polar_customer_id: Patch::Clear,
            polar_subscription_id: Patch::Clear,
            current_period_end: Patch::Clear,
            trial_ends_at: Patch::Clear,
            last_active_date: None,
        }
    }

    /// Consistent plan/status/limit triple for a mapped status, keeping the
    /// plan/status invariant intact by construction: active statuses imply
    /// pro, inactive implies no plan.
    pub fn for_status(status: SubscriptionStatus) -> Self {
        let plan = if status.is_active() {
            Patch::Set(SubscriptionPlan::Pro)
        } else {
            Patch::Clear
        };
        let limit = if status.is_active() {
            usage_limit_for(Some(SubscriptionPlan::Pro))
        } else {
            usage_limit_for(None)
        };
        Self {
            plan,
            status: Some(status),
            monthly_usage_limit: Some(limit),
            ..Self::default()
        }
    }
}

/// Storage contract for user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_by_clerk_id(&self, clerk_user_id: &str) -> BillingResult<Option<UserProfile>>;

    /// Resolve a webhook's customer id back to a profile, for payloads that
    /// do not carry the Clerk user id in metadata.
    async fn get_by_polar_customer_id(
        &self,
        polar_customer_id: &str,
    ) -> BillingResult<Option<UserProfile>>;

    /// Create a row with free-tier defaults. Fails with
    /// `ProfileAlreadyExists` if the user already has one.
    async fn create(&self, clerk_user_id: &str) -> BillingResult<UserProfile>;

    /// Apply a partial update. Fails with `ProfileNotFound` if no row
    /// exists.
    async fn update(&self, clerk_user_id: &str, patch: ProfilePatch) -> BillingResult<UserProfile>;

    /// Return the existing row (refreshing `last_active_date`) or create one
    /// with defaults.
    async fn get_or_create(&self, clerk_user_id: &str) -> BillingResult<UserProfile>;

    async fn touch_last_active(&self, clerk_user_id: &str) -> BillingResult<()>;
}

/// Postgres-backed profile store.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_by_clerk_id(&self, clerk_user_id: &str) -> BillingResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT * FROM user_profiles WHERE clerk_user_id = $1",
        )
        .bind(clerk_user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn get_by_polar_customer_id(
        &self,
        polar_customer_id: &str,
    ) -> BillingResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT * FROM user_profiles WHERE polar_customer_id = $1",
        )
        .bind(polar_customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn create(&self, clerk_user_id: &str) -> BillingResult<UserProfile> {
        let result = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles
                (clerk_user_id, subscription_status, monthly_usage_limit, last_active_date)
            VALUES ($1, $2, $3, NOW())
            RETURNING *
            "#,
        )
        .bind(clerk_user_id)
        .bind(SubscriptionStatus::Inactive)
        .bind(FREE_MONTHLY_USAGE_LIMIT)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(profile) => Ok(profile),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(BillingError::ProfileAlreadyExists(clerk_user_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, clerk_user_id: &str, patch: ProfilePatch) -> BillingResult<UserProfile> {
        let mut query =
            QueryBuilder::<sqlx::Postgres>::new("UPDATE user_profiles SET updated_at = NOW()");

        match patch.plan {
            Patch::Set(plan) => {
                query.push(", subscription_plan = ").push_bind(plan);
            }
            Patch::Clear => {
                query.push(", subscription_plan = NULL");
            }
            Patch::Keep => {}
        }
        if let Some(status) = patch.status {
            query.push(", subscription_status = ").push_bind(status);
        }
        if let Some(limit) = patch.monthly_usage_limit {
            query.push(", monthly_usage_limit = ").push_bind(limit);
        }
        match patch.polar_customer_id {
            Patch::Set(id) => {
                query.push(", polar_customer_id = ").push_bind(id);
            }
            Patch::Clear => {
                query.push(", polar_customer_id = NULL");
            }
            Patch::Keep => {}
        }
        match patch.polar_subscription_id {
            Patch::Set(id) => {
                query.push(", polar_subscription_id = ").push_bind(id);
            }
            Patch::Clear => {
                query.push(", polar_subscription_id = NULL");
            }
            Patch::Keep => {}
        }
        match patch.current_period_end {
            Patch::Set(at) => {
                query.push(", current_period_end = ").push_bind(at);
            }
            Patch::Clear => {
                query.push(", current_period_end = NULL");
            }
            Patch::Keep => {}
        }
        match patch.trial_ends_at {
            Patch::Set(at) => {
                query.push(", trial_ends_at = ").push_bind(at);
            }
            Patch::Clear => {
                query.push(", trial_ends_at = NULL");
            }
            Patch::Keep => {}
        }
        if let Some(at) = patch.last_active_date {
            query.push(", last_active_date = ").push_bind(at);
        }

        query
            .push(" WHERE clerk_user_id = ")
            .push_bind(clerk_user_id)
            .push(" RETURNING *");

        let profile = query
            .build_query_as::<UserProfile>()
            .fetch_optional(&self.pool)
            .await?;

        profile.ok_or_else(|| BillingError::ProfileNotFound(clerk_user_id.to_string()))
    }

    async fn get_or_create(&self, clerk_user_id: &str) -> BillingResult<UserProfile> {
        if let Some(profile) = self.get_by_clerk_id(clerk_user_id).await? {
            self.touch_last_active(clerk_user_id).await?;
            return Ok(profile);
        }

        match self.create(clerk_user_id).await {
            Ok(profile) => Ok(profile),
            // Lost a creation race; the row exists now.
            Err(BillingError::ProfileAlreadyExists(_)) => self
                .get_by_clerk_id(clerk_user_id)
                .await?
                .ok_or_else(|| BillingError::ProfileNotFound(clerk_user_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn touch_last_active(&self, clerk_user_id: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE user_profiles SET last_active_date = NOW(), updated_at = NOW() \
             WHERE clerk_user_id = $1",
        )
        .bind(clerk_user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
