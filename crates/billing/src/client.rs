//! Polar API client
//!
//! Thin reqwest wrapper over the handful of Polar endpoints this system
//! invokes: checkout creation, subscription mutation, subscription lookup,
//! and customer-portal session creation. Wire types double as the webhook
//! payload shapes, since Polar delivers the same objects over both channels.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

const PRODUCTION_API_BASE: &str = "https://api.polar.sh";
const SANDBOX_API_BASE: &str = "https://sandbox-api.polar.sh";

/// Polar configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct PolarConfig {
    pub access_token: String,
    pub webhook_secret: String,
    /// Product id of the single paid tier.
    pub pro_product_id: String,
    pub api_base: String,
    /// Base URL of the application, used for checkout success redirects.
    pub app_url: String,
}

impl PolarConfig {
    pub fn from_env() -> BillingResult<Self> {
        let access_token = require_env("POLAR_ACCESS_TOKEN")?;
        let webhook_secret = require_env("POLAR_WEBHOOK_SECRET")?;
        let pro_product_id = require_env("POLAR_PRO_PRODUCT_ID")?;

        let api_base = match std::env::var("POLAR_ENVIRONMENT").as_deref() {
            Ok("production") => PRODUCTION_API_BASE.to_string(),
            _ => SANDBOX_API_BASE.to_string(),
        };

        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            access_token,
            webhook_secret,
            pro_product_id,
            api_base,
            app_url,
        })
    }

    /// Default redirect after a successful checkout.
    pub fn checkout_success_url(&self) -> String {
        format!("{}/dashboard/subscription?success=true", self.app_url)
    }
}

fn require_env(name: &str) -> BillingResult<String> {
    std::env::var(name).map_err(|_| BillingError::Config(format!("{name} must be set")))
}

/// Subscription object as delivered by Polar, via webhook or API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolarSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PolarSubscription {
    /// Clerk user id carried in checkout metadata, when present.
    pub fn clerk_user_id(&self) -> Option<&str> {
        self.metadata.get("clerk_user_id").map(String::as_str)
    }
}

/// Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct PolarCheckout {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PolarCheckout {
    pub fn clerk_user_id(&self) -> Option<&str> {
        self.metadata.get("clerk_user_id").map(String::as_str)
    }
}

/// Order object, carrying the subscription it paid for.
#[derive(Debug, Clone, Deserialize)]
pub struct PolarOrder {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub subscription: Option<PolarSubscription>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PolarOrder {
    pub fn clerk_user_id(&self) -> Option<&str> {
        self.metadata
            .get("clerk_user_id")
            .map(String::as_str)
            .or_else(|| {
                self.subscription
                    .as_ref()
                    .and_then(|sub| sub.clerk_user_id())
            })
    }
}

/// Request body for checkout creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckout {
    pub products: Vec<String>,
    pub success_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_customer_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Partial update for a subscription. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_at_period_end: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proration_behavior: Option<&'static str>,
}

impl SubscriptionUpdate {
    /// Switch the subscription to another product, invoicing the difference
    /// immediately instead of issuing a new checkout.
    pub fn switch_product(product_id: String) -> Self {
        Self {
            product_id: Some(product_id),
            proration_behavior: Some("invoice"),
            ..Self::default()
        }
    }

    pub fn cancel_at_period_end(cancel: bool) -> Self {
        Self {
            cancel_at_period_end: Some(cancel),
            ..Self::default()
        }
    }
}

/// Customer-portal session minted by Polar.
#[derive(Debug, Clone, Deserialize)]
pub struct PolarCustomerSession {
    #[serde(default)]
    pub customer_portal_url: Option<String>,
}

/// Client for the Polar REST API.
#[derive(Clone)]
pub struct PolarClient {
    http: reqwest::Client,
    config: PolarConfig,
}

impl PolarClient {
    pub fn new(config: PolarConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(PolarConfig::from_env()?))
    }

    pub fn config(&self) -> &PolarConfig {
        &self.config
    }

    pub async fn create_checkout(&self, request: &CreateCheckout) -> BillingResult<PolarCheckout> {
        let response = self
            .http
            .post(format!("{}/v1/checkouts", self.config.api_base))
            .bearer_auth(&self.config.access_token)
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> BillingResult<PolarSubscription> {
        let response = self
            .http
            .get(format!(
                "{}/v1/subscriptions/{}",
                self.config.api_base, subscription_id
            ))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> BillingResult<PolarSubscription> {
        let response = self
            .http
            .patch(format!(
                "{}/v1/subscriptions/{}",
                self.config.api_base, subscription_id
            ))
            .bearer_auth(&self.config.access_token)
            .json(update)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn create_customer_session(
        &self,
        customer_id: &str,
    ) -> BillingResult<PolarCustomerSession> {
        let response = self
            .http
            .post(format!("{}/v1/customer-sessions", self.config.api_base))
            .bearer_auth(&self.config.access_token)
            .json(&serde_json::json!({ "customer_id": customer_id }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Deserialize a success body, or map an error status to
    /// `BillingError::Provider` preserving Polar's message.
    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> BillingResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("error"))
                    .map(|d| d.to_string())
            })
            .unwrap_or(body);

        tracing::warn!(status = status.as_u16(), message = %message, "Polar API call failed");
        Err(BillingError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}
