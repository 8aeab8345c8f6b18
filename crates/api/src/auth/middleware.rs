//! Authentication middleware for Axum
//!
//! Verifies Clerk session JWTs (RS256, instance public key) and attaches the
//! caller's identity to the request. Route handlers receive the opaque Clerk
//! user id; nothing else from the token is trusted.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller identity extracted from the session JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Clerk user id (`user_...`), the profile table's natural key.
    pub user_id: String,
}

/// Claims carried by a Clerk session token.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// RS256 verifier for Clerk session tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    /// Build from the instance's PEM-encoded RSA public key.
    pub fn from_pem(pem: &str) -> anyhow::Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid CLERK_JWT_PUBLIC_KEY: {e}"))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        Ok(Self {
            decoding_key: Arc::new(decoding_key),
            validation,
        })
    }

    fn verify(&self, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims.sub)
    }
}

/// Require a valid bearer token; attaches `AuthUser` as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let user_id = state.jwt_verifier.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Session token rejected");
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

/// Authorization guard for the outbound billing actions: a caller may only
/// act on their own subscription. Runs before any store or provider call.
pub fn ensure_self(auth_user: &AuthUser, target_user_id: &str) -> Result<(), ApiError> {
    if auth_user.user_id != target_user_id {
        return Err(ApiError::Forbidden(
            "you may only act on your own subscription".to_string(),
        ));
    }
    Ok(())
}
