//! Delivery provider merchant API.
//!
//! The sync engine talks to the provider only through the [`DeliveryProvider`]
//! trait. [`ProviderClient`] is the HTTP implementation used in production;
//! tests substitute in-memory fakes.
//!
//! # Architecture
//!
//! - Username/password login → session token with an expiry
//! - Tokens are stored per staff member in `provider_credentials`, never here
//! - Every call takes the token explicitly so one client serves every account
//! - Reference data (cities, regions, statuses) is cached per token via `moka`

pub mod auth;
pub mod client;
pub mod orders;
pub mod reference;

pub use auth::ProviderSession;
pub use client::ProviderClient;
pub use orders::{CreateOrderPayload, CreatedOrder, RemoteOrder};
pub use reference::{City, ReferenceData, Region, RemoteStatus};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use dispatch_sync_core::TrackingKey;

/// Errors that can occur when interacting with the provider API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Provider answered with a failure envelope.
    #[error("Provider error: {0}")]
    Api(String),

    /// Provider answered with a 5xx status.
    #[error("Provider unavailable (HTTP {0})")]
    Unavailable(u16),

    /// Rate limited by the provider.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed (invalid username/password).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Session token rejected or expired.
    #[error("Access token expired")]
    TokenExpired,
}

impl ProviderError {
    /// Whether the failure is worth retrying on a later cycle.
    ///
    /// Transient failures never count as evidence that an order is gone.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Unavailable(_) | Self::RateLimited(_) => true,
            Self::Parse(_) | Self::Api(_) | Self::AuthenticationFailed(_) | Self::TokenExpired => {
                false
            }
        }
    }
}

/// The provider's merchant API as consumed by the sync engine.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Provider name, as stored on orders and credentials.
    fn name(&self) -> &str;

    /// Exchange username/password for a session token.
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<ProviderSession, ProviderError>;

    /// Every order visible to the token's merchant account.
    async fn list_merchant_orders(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteOrder>, ProviderError>;

    /// Point lookup by tracking key. `Ok(None)` means the provider answered
    /// and has no such order.
    async fn get_order_by_tracking_key(
        &self,
        token: &SecretString,
        key: &TrackingKey,
    ) -> Result<Option<RemoteOrder>, ProviderError>;

    /// Create an order at the provider.
    async fn create_order(
        &self,
        token: &SecretString,
        payload: &CreateOrderPayload,
    ) -> Result<CreatedOrder, ProviderError>;

    /// Cities the provider delivers to.
    async fn list_cities(&self, token: &SecretString) -> Result<Vec<City>, ProviderError>;

    /// Regions within a city.
    async fn list_regions_by_city(
        &self,
        token: &SecretString,
        city_id: &str,
    ) -> Result<Vec<Region>, ProviderError>;

    /// The provider's status vocabulary.
    async fn list_order_statuses(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteStatus>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Api("order not found".to_string());
        assert_eq!(err.to_string(), "Provider error: order not found");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ProviderError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Unavailable(503).is_transient());
        assert!(!ProviderError::TokenExpired.is_transient());
        assert!(!ProviderError::AuthenticationFailed("bad".to_string()).is_transient());
        assert!(!ProviderError::Api("rejected".to_string()).is_transient());
    }
}
