//! Middleware module - Session authentication and per-user rate limiting

pub mod auth;
pub mod rate_limit;

pub use auth::{AuthLayer, Identity, SessionResolver};
pub use rate_limit::RateLimitLayer;
