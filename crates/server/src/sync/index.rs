//! Lookup tables over one fetched batch of remote orders.

use std::collections::HashMap;

use tracing::warn;

use dispatch_sync_core::{RemoteOrderId, TrackingKey};

use crate::provider::RemoteOrder;

/// O(1) lookup of remote orders by remote id and by tracking key.
///
/// Both the primary and the alias tracking key of each record are indexed.
/// Records with neither an id nor a key are dropped and counted.
#[derive(Debug, Default)]
pub struct RemoteOrderIndex {
    orders: Vec<RemoteOrder>,
    by_remote_id: HashMap<RemoteOrderId, usize>,
    by_tracking_key: HashMap<TrackingKey, usize>,
    malformed: usize,
}

impl RemoteOrderIndex {
    /// Index one batch. When two records share an identifier, the first wins.
    #[must_use]
    pub fn build(batch: Vec<RemoteOrder>) -> Self {
        let mut index = Self::default();

        for order in batch {
            if order.is_malformed() {
                warn!(
                    status = order.status_text.as_deref().unwrap_or_default(),
                    "Skipping remote order without id or tracking key"
                );
                index.malformed += 1;
                continue;
            }

            let position = index.orders.len();
            if let Some(remote_id) = &order.remote_id {
                index
                    .by_remote_id
                    .entry(remote_id.clone())
                    .or_insert(position);
            }
            for key in order.tracking_keys() {
                index.by_tracking_key.entry(key.clone()).or_insert(position);
            }
            index.orders.push(order);
        }

        index
    }

    /// Look up by remote id.
    #[must_use]
    pub fn by_remote_id(&self, remote_id: &RemoteOrderId) -> Option<&RemoteOrder> {
        self.by_remote_id
            .get(remote_id)
            .and_then(|&i| self.orders.get(i))
    }

    /// Look up by primary or alias tracking key.
    #[must_use]
    pub fn by_tracking_key(&self, key: &TrackingKey) -> Option<&RemoteOrder> {
        self.by_tracking_key
            .get(key)
            .and_then(|&i| self.orders.get(i))
    }

    /// Number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether no record was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of records dropped for lacking any identifier.
    #[must_use]
    pub const fn malformed(&self) -> usize {
        self.malformed
    }
}
