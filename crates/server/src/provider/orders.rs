//! Remote order records as returned by the provider.
//!
//! The provider is loose with types: ids arrive as numbers or strings, the
//! funds flag as a bool, `0/1` or `"yes"`, and fees as numeric strings. Raw
//! records are deserialized into `serde_json::Value` fields and normalized
//! into [`RemoteOrder`] without ever failing on a single odd field.

use serde::{Deserialize, Serialize};

use dispatch_sync_core::{DeliveryFee, RemoteOrderId, TrackingKey};

/// An order as represented inside the provider's system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteOrder {
    /// Provider's internal id.
    pub remote_id: Option<RemoteOrderId>,
    /// Primary tracking key.
    pub tracking_key: Option<TrackingKey>,
    /// Secondary tracking key field; often identical to the primary.
    pub alias_tracking_key: Option<TrackingKey>,
    /// Provider status code.
    pub status_code: Option<String>,
    /// Provider status text.
    pub status_text: Option<String>,
    /// Whether the provider settled the collected funds to the merchant.
    pub funds_confirmed: bool,
    /// Delivery fee.
    pub delivery_fee: Option<DeliveryFee>,
}

impl RemoteOrder {
    /// Whether the record carries neither an id nor any tracking key.
    ///
    /// Such records can never be matched and are skipped.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        self.remote_id.is_none() && self.tracking_key.is_none() && self.alias_tracking_key.is_none()
    }

    /// Tracking keys carried by this record, without duplicates.
    pub fn tracking_keys(&self) -> impl Iterator<Item = &TrackingKey> {
        let alias = self
            .alias_tracking_key
            .as_ref()
            .filter(|alias| Some(*alias) != self.tracking_key.as_ref());
        self.tracking_key.iter().chain(alias)
    }
}

/// Raw order record as sent by the provider.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRemoteOrder {
    #[serde(default, alias = "order_id")]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "receipt_num", alias = "qr_id")]
    tracking_key: Option<serde_json::Value>,
    #[serde(default, alias = "client_order_id", alias = "merchant_reference")]
    alias_tracking_key: Option<serde_json::Value>,
    #[serde(default, alias = "status_code")]
    status_id: Option<serde_json::Value>,
    #[serde(default, alias = "status_text")]
    status: Option<serde_json::Value>,
    #[serde(default, alias = "merchant_invoice_received", alias = "is_settled")]
    funds_received: Option<serde_json::Value>,
    #[serde(default, alias = "delivery_price")]
    delivery_fee: Option<serde_json::Value>,
}

impl From<RawRemoteOrder> for RemoteOrder {
    fn from(raw: RawRemoteOrder) -> Self {
        Self {
            remote_id: raw.id.as_ref().and_then(RemoteOrderId::from_json),
            tracking_key: raw.tracking_key.as_ref().and_then(TrackingKey::from_json),
            alias_tracking_key: raw
                .alias_tracking_key
                .as_ref()
                .and_then(TrackingKey::from_json),
            status_code: raw.status_id.as_ref().and_then(scalar_to_string),
            status_text: raw.status.as_ref().and_then(scalar_to_string),
            funds_confirmed: raw.funds_received.as_ref().is_some_and(truthy),
            delivery_fee: raw.delivery_fee.as_ref().and_then(DeliveryFee::from_json),
        }
    }
}

/// Parse a list of raw records, skipping entries that are not JSON objects.
pub(crate) fn parse_remote_orders(values: Vec<serde_json::Value>) -> Vec<RemoteOrder> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawRemoteOrder>(value) {
            Ok(raw) => Some(RemoteOrder::from(raw)),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable remote order record");
                None
            }
        })
        .collect()
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes")
        }
        _ => false,
    }
}

/// Payload for handing a local order to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderPayload {
    /// Recipient name.
    pub client_name: String,
    /// Recipient phone number.
    pub client_phone: String,
    /// Destination city id (from reference data).
    pub city_id: String,
    /// Destination region id (from reference data).
    pub region_id: String,
    /// Free-form address details.
    pub location: String,
    /// Amount to collect on delivery.
    pub price: rust_decimal::Decimal,
    /// Number of items in the parcel.
    pub items_number: u32,
    /// Notes for the courier.
    #[serde(default)]
    pub notes: Option<String>,
    /// Local order reference.
    pub merchant_reference: String,
}

/// Identifiers assigned by the provider to a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedOrder {
    /// Provider's internal id.
    pub remote_id: RemoteOrderId,
    /// Tracking key.
    pub tracking_key: TrackingKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> RemoteOrder {
        let raw: RawRemoteOrder = serde_json::from_value(json).expect("valid raw order");
        RemoteOrder::from(raw)
    }

    #[test]
    fn test_numeric_fields_are_stringified() {
        let order = parse(serde_json::json!({
            "id": 88123,
            "qr_id": " RY-1001 ",
            "status_id": 4,
            "status": "Delivered",
            "delivery_price": "5000",
        }));

        assert_eq!(order.remote_id, RemoteOrderId::parse("88123"));
        assert_eq!(order.tracking_key, TrackingKey::parse("RY-1001"));
        assert_eq!(order.status_code.as_deref(), Some("4"));
        assert_eq!(order.status_text.as_deref(), Some("Delivered"));
        assert!(order.delivery_fee.is_some());
        assert!(!order.funds_confirmed);
    }

    #[test]
    fn test_funds_flag_variants() {
        for value in [
            serde_json::json!(true),
            serde_json::json!(1),
            serde_json::json!("1"),
            serde_json::json!("yes"),
        ] {
            let order = parse(serde_json::json!({"id": 1, "funds_received": value}));
            assert!(order.funds_confirmed);
        }
        let order = parse(serde_json::json!({"id": 1, "funds_received": "0"}));
        assert!(!order.funds_confirmed);
    }

    #[test]
    fn test_missing_fields_do_not_fail() {
        let order = parse(serde_json::json!({"status": "pending"}));
        assert!(order.is_malformed());
        assert_eq!(order.delivery_fee, None);
    }

    #[test]
    fn test_tracking_keys_deduplicate_alias() {
        let order = parse(serde_json::json!({
            "id": 1,
            "tracking_key": "A-1",
            "alias_tracking_key": "A-1",
        }));
        assert_eq!(order.tracking_keys().count(), 1);

        let order = parse(serde_json::json!({
            "id": 1,
            "tracking_key": "A-1",
            "alias_tracking_key": "B-7",
        }));
        assert_eq!(order.tracking_keys().count(), 2);
    }

    #[test]
    fn test_parse_remote_orders_skips_non_objects() {
        let orders = parse_remote_orders(vec![
            serde_json::json!({"id": 1}),
            serde_json::json!("garbage"),
        ]);
        assert_eq!(orders.len(), 1);
    }
}
