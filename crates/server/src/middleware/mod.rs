//! HTTP middleware stack for the sync API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Bearer token check (every route except health checks)

pub mod auth;
pub mod request_id;

pub use auth::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER, CurrentActor, require_api_token};
pub use request_id::request_id_middleware;
