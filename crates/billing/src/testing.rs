//! In-memory profile store for tests
//!
//! Implements the storage contract over a mutex-guarded map and counts
//! `update` calls so tests can assert that duplicate deliveries are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use launchkit_shared::{SubscriptionStatus, UserProfile, FREE_MONTHLY_USAGE_LIMIT};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::profiles::{Patch, ProfilePatch, ProfileStore};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
    update_calls: AtomicUsize,
}

fn default_profile(clerk_user_id: &str) -> UserProfile {
    let now = OffsetDateTime::now_utc();
    UserProfile {
        id: Uuid::new_v4(),
        clerk_user_id: clerk_user_id.to_string(),
        subscription_plan: None,
        subscription_status: SubscriptionStatus::Inactive,
        monthly_usage_limit: FREE_MONTHLY_USAGE_LIMIT,
        trial_ends_at: None,
        last_active_date: Some(now),
        polar_customer_id: None,
        polar_subscription_id: None,
        current_period_end: None,
        created_at: now,
        updated_at: now,
    }
}

fn apply_patch(profile: &mut UserProfile, patch: ProfilePatch) {
    match patch.plan {
        Patch::Set(plan) => profile.subscription_plan = Some(plan),
        Patch::Clear => profile.subscription_plan = None,
        Patch::Keep => {}
    }
    if let Some(status) = patch.status {
        profile.subscription_status = status;
    }
    if let Some(limit) = patch.monthly_usage_limit {
        profile.monthly_usage_limit = limit;
    }
    match patch.polar_customer_id {
        Patch::Set(id) => profile.polar_customer_id = Some(id),
        Patch::Clear => profile.polar_customer_id = None,
        Patch::Keep => {}
    }
    match patch.polar_subscription_id {
        Patch::Set(id) => profile.polar_subscription_id = Some(id),
        Patch::Clear => profile.polar_subscription_id = None,
        Patch::Keep => {}
    }
    match patch.current_period_end {
        Patch::Set(at) => profile.current_period_end = Some(at),
        Patch::Clear => profile.current_period_end = None,
        Patch::Keep => {}
    }
    match patch.trial_ends_at {
        Patch::Set(at) => profile.trial_ends_at = Some(at),
        Patch::Clear => profile.trial_ends_at = None,
        Patch::Keep => {}
    }
    if let Some(at) = patch.last_active_date {
        profile.last_active_date = Some(at);
    }
    profile.updated_at = OffsetDateTime::now_utc();
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a profile, customized from free-tier defaults.
    pub async fn seed<F: FnOnce(&mut UserProfile)>(&self, clerk_user_id: &str, customize: F) {
        let mut profile = default_profile(clerk_user_id);
        customize(&mut profile);
        self.profiles
            .lock()
            .await
            .insert(clerk_user_id.to_string(), profile);
    }

    /// Number of `update` invocations seen so far.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_by_clerk_id(&self, clerk_user_id: &str) -> BillingResult<Option<UserProfile>> {
        Ok(self.profiles.lock().await.get(clerk_user_id).cloned())
    }

    async fn get_by_polar_customer_id(
        &self,
        polar_customer_id: &str,
    ) -> BillingResult<Option<UserProfile>> {
        Ok(self
            .profiles
            .lock()
            .await
            .values()
            .find(|p| p.polar_customer_id.as_deref() == Some(polar_customer_id))
            .cloned())
    }

    async fn create(&self, clerk_user_id: &str) -> BillingResult<UserProfile> {
        let mut profiles = self.profiles.lock().await;
        if profiles.contains_key(clerk_user_id) {
            return Err(BillingError::ProfileAlreadyExists(clerk_user_id.to_string()));
        }
        let profile = default_profile(clerk_user_id);
        profiles.insert(clerk_user_id.to_string(), profile.clone());
        Ok(profile)
    }

    async fn update(&self, clerk_user_id: &str, patch: ProfilePatch) -> BillingResult<UserProfile> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .get_mut(clerk_user_id)
            .ok_or_else(|| BillingError::ProfileNotFound(clerk_user_id.to_string()))?;
        apply_patch(profile, patch);
        Ok(profile.clone())
    }

    async fn get_or_create(&self, clerk_user_id: &str) -> BillingResult<UserProfile> {
        let mut profiles = self.profiles.lock().await;
        if let Some(profile) = profiles.get_mut(clerk_user_id) {
            profile.last_active_date = Some(OffsetDateTime::now_utc());
            return Ok(profile.clone());
        }
        let profile = default_profile(clerk_user_id);
        profiles.insert(clerk_user_id.to_string(), profile.clone());
        Ok(profile)
    }

    async fn touch_last_active(&self, clerk_user_id: &str) -> BillingResult<()> {
        if let Some(profile) = self.profiles.lock().await.get_mut(clerk_user_id) {
            profile.last_active_date = Some(OffsetDateTime::now_utc());
            profile.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}
