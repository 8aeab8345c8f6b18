//! Server configuration

/// Configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Comma-separated CORS origin allowlist.
    pub allowed_origins: Vec<String>,
    /// Secret key for the Clerk backend API (user lookups).
    pub clerk_secret_key: String,
    /// Signing secret for Clerk webhooks (Svix `whsec_...`).
    pub clerk_webhook_secret: String,
    /// PEM-encoded RSA public key for verifying Clerk session JWTs.
    pub clerk_jwt_public_key: String,
    /// Expose the debug endpoints (reset, provider snapshot). Off unless
    /// explicitly enabled.
    pub enable_debug_routes: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let clerk_secret_key = required("CLERK_SECRET_KEY")?;
        let clerk_webhook_secret = required("CLERK_WEBHOOK_SECRET")?;
        let clerk_jwt_public_key = required("CLERK_JWT_PUBLIC_KEY")?;

        let enable_debug_routes = std::env::var("ENABLE_DEBUG_ROUTES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            bind_address,
            allowed_origins,
            clerk_secret_key,
            clerk_webhook_secret,
            clerk_jwt_public_key,
            enable_debug_routes,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))
}
