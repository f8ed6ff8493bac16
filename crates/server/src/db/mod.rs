//! Persistence for the sync engine.
//!
//! # Database: `dispatch_sync`
//!
//! ## Tables
//!
//! - `provider_credentials` - Provider account tokens per staff member
//! - `orders` - Locally persisted orders mirrored at a provider
//! - `order_line_items` - Reserved stock per order
//! - `inventory_levels` - Reserved/available quantity per product and variant
//! - `sync_events` - Append-only engine event log
//! - `sync_settings` - Per-user engine flags
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p dispatch-sync-cli -- migrate
//! ```
//!
//! The engine never touches these repositories directly. It talks to the
//! store traits below so tests can run it against in-memory fakes.

pub mod credentials;
pub mod events;
pub mod orders;
pub mod settings;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use dispatch_sync_core::{CredentialId, OrderId, RemoteOrderId, TrackingKey, UserId};

use crate::models::{
    LocalOrder, NewCredential, OrderFilter, OrderLineItem, OrderUpdate, ProviderCredential,
    StockRelease,
};
use crate::sync::SyncEvent;

pub use credentials::CredentialRepository;
pub use events::EventRepository;
pub use orders::OrderRepository;
pub use settings::SettingsRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate account username).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The row changed since it was read and the write was abandoned.
    #[error("row changed since it was read")]
    Changed,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Store traits
// =============================================================================

/// Local order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders passing a filter, oldest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<LocalOrder>, RepositoryError>;

    /// A single order.
    async fn get_order(&self, id: OrderId) -> Result<Option<LocalOrder>, RepositoryError>;

    /// The order carrying a tracking key at a provider.
    async fn find_by_tracking_key(
        &self,
        provider: &str,
        key: &TrackingKey,
    ) -> Result<Option<LocalOrder>, RepositoryError>;

    /// Line items holding reserved stock for an order.
    async fn line_items(&self, id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError>;

    /// Write a reconciler update. When `update.release_stock` is set, reserved
    /// stock of every line item is released in the same transaction, unless
    /// the stored status already released it.
    ///
    /// Returns the stock that was released.
    async fn apply_update(&self, update: &OrderUpdate)
    -> Result<Vec<StockRelease>, RepositoryError>;

    /// Release all reserved stock of an order and delete it, atomically.
    ///
    /// `verified` is the copy of the order the deletion was verified against.
    /// The stored row is re-read under a lock and must still satisfy
    /// [`LocalOrder::still_deletable_as`].
    ///
    /// Returns `RepositoryError::NotFound` if the order no longer exists and
    /// `RepositoryError::Changed` if it no longer qualifies.
    async fn delete_releasing_stock(
        &self,
        verified: &LocalOrder,
    ) -> Result<Vec<StockRelease>, RepositoryError>;

    /// Store the identifiers assigned at hand-off. Returns `false` if the
    /// order already carried a remote id and nothing was written.
    async fn record_handoff(
        &self,
        id: OrderId,
        remote_id: &RemoteOrderId,
        tracking_key: &TrackingKey,
    ) -> Result<bool, RepositoryError>;
}

/// Provider credential persistence. Plain CRUD; the account rules live in
/// [`crate::services::AccountService`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Every row of an owner for a provider, expired ones included.
    async fn list_credentials(
        &self,
        owner: UserId,
        provider: &str,
    ) -> Result<Vec<ProviderCredential>, RepositoryError>;

    /// Insert a new row.
    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<ProviderCredential, RepositoryError>;

    /// Replace the token of an existing row after a re-login.
    async fn update_token(
        &self,
        id: CredentialId,
        token: &SecretString,
        expires_at: DateTime<Utc>,
        merchant_id: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Delete a row.
    async fn delete_credential(&self, id: CredentialId) -> Result<(), RepositoryError>;

    /// Clear the default flag on every other row of the owner/provider, then
    /// set it on `id`.
    async fn set_default(
        &self,
        owner: UserId,
        provider: &str,
        id: CredentialId,
    ) -> Result<(), RepositoryError>;

    /// Record a use of the token.
    async fn touch(&self, id: CredentialId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

/// Append-only sink for engine events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one event.
    async fn append(&self, event: &SyncEvent) -> Result<(), RepositoryError>;
}

/// Per-user engine flags.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a flag, `false` when unset.
    async fn get_flag(&self, user: UserId, key: &str) -> Result<bool, RepositoryError>;

    /// Write a flag.
    async fn set_flag(&self, user: UserId, key: &str, value: bool) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound.to_string(), "not found");
        assert_eq!(
            RepositoryError::Changed.to_string(),
            "row changed since it was read"
        );
        assert_eq!(
            RepositoryError::Conflict("duplicate username".to_string()).to_string(),
            "constraint violation: duplicate username"
        );
    }
}
