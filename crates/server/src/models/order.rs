//! Local order models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dispatch_sync_core::{
    DeliveryFee, OrderId, OrderStatus, ProductId, RemoteOrderId, TrackingKey, UserId, VariantId,
};

/// An order persisted locally and mirrored at a delivery provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalOrder {
    /// Local order ID.
    pub id: OrderId,
    /// Staff member who owns the order.
    pub owner_id: UserId,
    /// Provider-issued tracking key.
    pub tracking_key: Option<TrackingKey>,
    /// Provider's internal id. Once set, cleared only by deleting the order.
    pub remote_order_id: Option<RemoteOrderId>,
    /// Canonical status.
    pub status: OrderStatus,
    /// Last status text reported by the provider.
    pub remote_status_text: Option<String>,
    /// Whether the provider confirmed the collected funds were settled.
    pub funds_confirmed: bool,
    /// Delivery fee reported by the provider.
    pub delivery_fee: Option<DeliveryFee>,
    /// When the order was created locally.
    pub created_at: DateTime<Utc>,
    /// Provider the order was handed to.
    pub provider: String,
}

impl LocalOrder {
    /// Whether the order carries any identifier the provider can be queried with.
    #[must_use]
    pub const fn has_tracking_identifier(&self) -> bool {
        self.tracking_key.is_some() || self.remote_order_id.is_some()
    }

    /// Whether `current`, re-read just before a delete, still qualifies for the
    /// deletion that was verified against `self`.
    ///
    /// Funds must still be unconfirmed, the status must still be deletable and
    /// the identifiers the provider was queried with must be unchanged.
    #[must_use]
    pub fn still_deletable_as(&self, current: &Self) -> bool {
        !current.funds_confirmed
            && current.status.is_deletable()
            && current.owner_id == self.owner_id
            && current.provider == self.provider
            && current.tracking_key == self.tracking_key
            && current.remote_order_id == self.remote_order_id
    }

    /// Identifier used for logs and notifications.
    #[must_use]
    pub fn display_key(&self) -> String {
        self.tracking_key.as_ref().map_or_else(
            || {
                self.remote_order_id
                    .as_ref()
                    .map_or_else(|| format!("#{}", self.id), ToString::to_string)
            },
            ToString::to_string,
        )
    }
}

/// A line item holding reserved stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderLineItem {
    /// Product.
    pub product_id: ProductId,
    /// Variant, if the product has variants.
    pub variant_id: Option<VariantId>,
    /// Reserved quantity.
    pub quantity: i32,
}

/// Reserved stock handed back to inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockRelease {
    /// Product.
    pub product_id: ProductId,
    /// Variant, if any.
    pub variant_id: Option<VariantId>,
    /// Quantity released.
    pub quantity: i32,
}

impl From<OrderLineItem> for StockRelease {
    fn from(item: OrderLineItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
        }
    }
}

/// A corrected tracking key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingKeyRepair {
    /// Key stored locally before the repair.
    pub previous: Option<TrackingKey>,
    /// Key reported by the provider.
    pub repaired: TrackingKey,
}

/// Changes the reconciler decided to write to one order.
///
/// Only fields that differ from the stored order are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderUpdate {
    /// Order being updated.
    pub order_id: OrderId,
    /// Owner of the order.
    pub owner_id: UserId,
    /// Status before the update.
    pub previous_status: OrderStatus,
    /// New canonical status.
    pub status: Option<OrderStatus>,
    /// New provider status text.
    pub status_text: Option<String>,
    /// New delivery fee.
    pub delivery_fee: Option<DeliveryFee>,
    /// Funds receipt newly confirmed.
    pub funds_confirmed: Option<bool>,
    /// Remote id recovered from a tracking-key-only match.
    pub remote_order_id: Option<RemoteOrderId>,
    /// Heuristic tracking-key repair, flagged for audit.
    pub tracking_key: Option<TrackingKeyRepair>,
    /// Release reserved stock together with this write.
    pub release_stock: bool,
}

impl OrderUpdate {
    /// Start an empty update for an order.
    #[must_use]
    pub fn for_order(order: &LocalOrder) -> Self {
        Self {
            order_id: order.id,
            owner_id: order.owner_id,
            previous_status: order.status,
            status: None,
            status_text: None,
            delivery_fee: None,
            funds_confirmed: None,
            remote_order_id: None,
            tracking_key: None,
            release_stock: false,
        }
    }

    /// Whether any observable field changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.status_text.is_none()
            && self.delivery_fee.is_none()
            && self.funds_confirmed.is_none()
            && self.remote_order_id.is_none()
            && self.tracking_key.is_none()
    }

    /// Status after the update is applied.
    #[must_use]
    pub fn resulting_status(&self) -> OrderStatus {
        self.status.unwrap_or(self.previous_status)
    }

    /// Apply this update to an in-memory copy of the order.
    pub fn apply_to(&self, order: &mut LocalOrder) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(text) = &self.status_text {
            order.remote_status_text = Some(text.clone());
        }
        if let Some(fee) = self.delivery_fee {
            order.delivery_fee = Some(fee);
        }
        if let Some(confirmed) = self.funds_confirmed {
            order.funds_confirmed = confirmed;
        }
        if let Some(remote_id) = &self.remote_order_id {
            order.remote_order_id = Some(remote_id.clone());
        }
        if let Some(repair) = &self.tracking_key {
            order.tracking_key = Some(repair.repaired.clone());
        }
    }
}

/// Filter for listing local orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Only orders handed to this provider.
    pub provider: String,
    /// Only orders owned by this user.
    pub owner: Option<UserId>,
    /// Only orders in one of these statuses. `None` means all.
    pub statuses: Option<Vec<OrderStatus>>,
}

impl OrderFilter {
    /// Whether an order passes this filter.
    #[must_use]
    pub fn matches(&self, order: &LocalOrder) -> bool {
        order.provider == self.provider
            && self.owner.is_none_or(|owner| order.owner_id == owner)
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&order.status))
    }
}
