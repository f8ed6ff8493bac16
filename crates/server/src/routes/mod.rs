//! HTTP route handlers for the sync API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                         - Liveness check
//! GET    /health/ready                   - Readiness check (database)
//!
//! # Sync (bearer token + actor headers)
//! POST   /sync/session                   - Start a session and run the login sync
//! DELETE /sync/session                   - End the session
//! POST   /sync/fast                      - Fast sync {show_notifications}
//! POST   /sync/correction                - One-time full-history correction
//! POST   /sync/deletion-pass             - Deletion pass over the actor's orders
//! POST   /sync/orders/{tracking_key}     - Reconcile one order
//! GET    /sync/state                     - Mode, countdown and last sync time
//! PUT    /sync/periodic                  - Enable/disable the periodic timer {enabled}
//!
//! # Provider accounts
//! GET    /accounts                       - Usable accounts of the actor
//! POST   /accounts/login                 - Connect an account {username, password}
//! PUT    /accounts/{username}/default    - Make an account the default
//! DELETE /accounts/{username}            - Disconnect an account
//!
//! # Orders
//! POST   /orders/{id}/handoff            - Create the order at the provider
//!
//! # Reference data
//! GET    /reference/cities               - Cities (?account=)
//! GET    /reference/cities/{id}/regions  - Regions of a city (?account=)
//! ```

pub mod accounts;
pub mod health;
pub mod orders;
pub mod reference;
pub mod sync;

use axum::{Router, middleware::from_fn, middleware::from_fn_with_state, routing::get};

use crate::middleware::{request_id_middleware, require_api_token};
use crate::state::AppState;

/// Build the complete router. Tracing and Sentry layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(sync::router())
        .merge(accounts::router())
        .merge(orders::router())
        .merge(reference::router())
        .route_layer(from_fn_with_state(state.clone(), require_api_token));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(protected)
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
