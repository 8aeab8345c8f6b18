//! Authentication module for Launchkit

pub mod middleware;

pub use middleware::{ensure_self, require_auth, AuthUser, JwtVerifier};
