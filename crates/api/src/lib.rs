#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Launchkit API Server
//!
//! Library surface of the API server: configuration, application state,
//! Clerk authentication, and the route handlers. The binary entry point
//! lives in `main.rs`.

pub mod auth;
pub mod clerk;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;
