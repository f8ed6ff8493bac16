//! In-process cache of the provider's status vocabulary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::taxonomy::{StatusMapping, classify_text};
use crate::provider::{DeliveryProvider, RemoteStatus};

/// Status code → canonical mapping, refreshed wholesale.
///
/// Readers get an `Arc` snapshot that never changes underneath them; a
/// refresh swaps in a complete new map.
pub struct StatusCatalog {
    ttl: Duration,
    state: RwLock<CatalogState>,
}

struct CatalogState {
    entries: Arc<HashMap<String, StatusMapping>>,
    loaded_at: Option<Instant>,
}

impl StatusCatalog {
    /// Create an empty catalog that refreshes after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CatalogState {
                entries: Arc::new(HashMap::new()),
                loaded_at: None,
            }),
        }
    }

    /// Current mappings.
    pub async fn snapshot(&self) -> Arc<HashMap<String, StatusMapping>> {
        Arc::clone(&self.state.read().await.entries)
    }

    /// Whether the catalog was never loaded or is older than its TTL.
    pub async fn is_stale(&self) -> bool {
        self.state
            .read()
            .await
            .loaded_at
            .is_none_or(|loaded_at| loaded_at.elapsed() >= self.ttl)
    }

    /// Replace every mapping from a freshly fetched status list.
    pub async fn replace(&self, statuses: &[RemoteStatus]) {
        let entries: HashMap<String, StatusMapping> = statuses
            .iter()
            .map(|status| (status.code.trim().to_string(), classify_text(&status.text)))
            .collect();

        let mut state = self.state.write().await;
        state.entries = Arc::new(entries);
        state.loaded_at = Some(Instant::now());
    }

    /// Refresh from the provider when stale.
    ///
    /// A failed refresh keeps the previous mappings; the text fallback still
    /// covers codes the catalog does not know.
    #[instrument(skip(self, provider, token))]
    pub async fn refresh_if_stale(&self, provider: &dyn DeliveryProvider, token: &SecretString) {
        if !self.is_stale().await {
            return;
        }

        match provider.list_order_statuses(token).await {
            Ok(statuses) => {
                debug!(count = statuses.len(), "Refreshed status catalog");
                self.replace(&statuses).await;
            }
            Err(e) => warn!(error = %e, "Status catalog refresh failed, keeping previous entries"),
        }
    }
}

#[cfg(test)]
mod tests {
    use dispatch_sync_core::OrderStatus;

    use super::*;

    fn status(code: &str, text: &str) -> RemoteStatus {
        RemoteStatus {
            code: code.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_is_stale() {
        let catalog = StatusCatalog::new(Duration::from_secs(60));
        assert!(catalog.is_stale().await);
        assert!(catalog.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_classifies_entries() {
        let catalog = StatusCatalog::new(Duration::from_secs(60));
        catalog
            .replace(&[status("4", "Delivered"), status("7", "Returned to merchant")])
            .await;

        let snapshot = catalog.snapshot().await;
        assert_eq!(
            snapshot.get("4").map(|m| m.status),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(
            snapshot.get("7").map(|m| m.releases_stock),
            Some(true)
        );
        assert!(!catalog.is_stale().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_goes_stale_after_ttl() {
        let catalog = StatusCatalog::new(Duration::from_secs(60));
        catalog.replace(&[status("1", "Pending")]).await;
        assert!(!catalog.is_stale().await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(catalog.is_stale().await);
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let catalog = StatusCatalog::new(Duration::from_secs(60));
        catalog.replace(&[status("1", "Pending")]).await;
        let old = catalog.snapshot().await;

        catalog.replace(&[status("2", "Shipped")]).await;
        let new = catalog.snapshot().await;

        assert!(old.contains_key("1"));
        assert!(!new.contains_key("1"));
        assert!(new.contains_key("2"));
    }
}
