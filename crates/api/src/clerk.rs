//! Clerk integration
//!
//! Two pieces: a small REST client for user lookups (checkout needs the
//! caller's email), and Svix-scheme signature verification for the Clerk
//! webhook endpoint (HMAC-SHA256 over `id.timestamp.payload` with the
//! base64-encoded `whsec_` secret, base64 signatures, bounded timestamp
//! skew).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const CLERK_API_BASE: &str = "https://api.clerk.com";

/// Maximum accepted webhook timestamp skew, in seconds.
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// A Clerk user, as returned by `GET /v1/users/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkUser {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEmailAddress {
    pub id: String,
    pub email_address: String,
}

impl ClerkUser {
    /// The user's primary email address, falling back to the first one.
    pub fn primary_email(&self) -> Option<&str> {
        let by_primary_id = self.primary_email_address_id.as_deref().and_then(|id| {
            self.email_addresses
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.email_address.as_str())
        });
        by_primary_id.or_else(|| {
            self.email_addresses
                .first()
                .map(|e| e.email_address.as_str())
        })
    }

    pub fn full_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }
}

/// Client for the Clerk backend API.
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl ClerkClient {
    pub fn new(secret_key: String) -> Self {
        Self::with_base_url(secret_key, CLERK_API_BASE.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            base_url,
        }
    }

    /// Look up a user by id.
    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<ClerkUser> {
        let response = self
            .http
            .get(format!("{}/v1/users/{}", self.base_url, user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Clerk user lookup failed for {user_id}: {}",
                response.status()
            );
        }

        Ok(response.json().await?)
    }
}

/// Verifier for Clerk (Svix) webhook signatures.
#[derive(Clone)]
pub struct ClerkWebhookVerifier {
    key: Vec<u8>,
}

impl ClerkWebhookVerifier {
    /// Build from a `whsec_`-prefixed base64 signing secret.
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
        let key = BASE64
            .decode(encoded)
            .map_err(|e| anyhow::anyhow!("invalid webhook secret: {e}"))?;
        Ok(Self { key })
    }

    /// Verify the `svix-id` / `svix-timestamp` / `svix-signature` header
    /// triple against the raw body.
    pub fn verify(&self, msg_id: &str, timestamp: &str, signature_header: &str, payload: &[u8]) -> bool {
        let Ok(ts) = timestamp.parse::<i64>() else {
            return false;
        };
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if (now - ts).abs() > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(timestamp = ts, now = now, "Clerk webhook timestamp out of tolerance");
            return false;
        }

        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        // Header holds space-delimited "v1,<base64 sig>" entries; any match
        // accepts.
        signature_header
            .split_ascii_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .any(|(_, sig)| {
                BASE64
                    .decode(sig)
                    .map(|decoded| bool::from(decoded.ct_eq(expected.as_slice())))
                    .unwrap_or(false)
            })
    }
}
