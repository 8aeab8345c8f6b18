//! Launchkit API Server
//!
//! Serves the billing webhook endpoints, the outbound Polar actions, and the
//! user profile API.

use std::net::SocketAddr;

use axum::http::{header, Method};
use launchkit_shared::{create_pool, run_migrations};
use tokio::time::{interval, Duration};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use launchkit_api::routes::create_router;
use launchkit_api::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,launchkit_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Launchkit API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let state = AppState::new(pool, config.clone())?;

    // Hourly wholesale clear of the webhook dedup cache. Unbounded-growth
    // mitigation; dedup correctness does not depend on the interval.
    let billing_for_cleanup = state.billing.clone();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(3600));
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            billing_for_cleanup.webhooks.clear_dedup_cache();
        }
    });
    tracing::info!("Webhook dedup cache cleanup task started (hourly)");

    // Restrict CORS to the configured origin allowlist.
    let allowed_origins: Vec<axum::http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    tracing::info!(
        allowed_origins = ?config.allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
