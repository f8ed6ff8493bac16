//! Per-order reconciliation decision.
//!
//! [`reconcile`] compares one local order with the remote index and decides
//! whether to write an update, hand the order to the deletion guard, or do
//! nothing. It performs no I/O.

use std::collections::HashMap;

use dispatch_sync_core::OrderStatus;

use super::index::RemoteOrderIndex;
use super::taxonomy::{StatusMapping, map_status};
use crate::models::{LocalOrder, OrderUpdate, TrackingKeyRepair};
use crate::provider::RemoteOrder;

/// Outcome of reconciling one local order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// At least one observable field differs from the remote record.
    Update(OrderUpdate),
    /// No remote record matched. Never a deletion by itself.
    DeletionCandidate,
    /// Matched and already consistent.
    NoOp,
}

/// Decide what to do with one local order.
#[must_use]
pub fn reconcile(
    order: &LocalOrder,
    index: &RemoteOrderIndex,
    catalog: &HashMap<String, StatusMapping>,
) -> Reconciliation {
    let Some(remote) = find_match(order, index) else {
        return Reconciliation::DeletionCandidate;
    };

    let update = diff(order, remote, catalog);
    if update.is_empty() {
        Reconciliation::NoOp
    } else {
        Reconciliation::Update(update)
    }
}

/// Match by remote id first, then by tracking key.
fn find_match<'a>(order: &LocalOrder, index: &'a RemoteOrderIndex) -> Option<&'a RemoteOrder> {
    order
        .remote_order_id
        .as_ref()
        .and_then(|remote_id| index.by_remote_id(remote_id))
        .or_else(|| {
            order
                .tracking_key
                .as_ref()
                .and_then(|key| index.by_tracking_key(key))
        })
}

/// Compute the changes a matched remote record implies.
pub(crate) fn diff(
    order: &LocalOrder,
    remote: &RemoteOrder,
    catalog: &HashMap<String, StatusMapping>,
) -> OrderUpdate {
    let mut update = OrderUpdate::for_order(order);

    let mapping = map_status(
        catalog,
        remote.status_code.as_deref(),
        remote.status_text.as_deref(),
    );

    // Funds confirmation never goes back to false
    let funds_confirmed =
        order.funds_confirmed || remote.funds_confirmed || mapping.funds_confirmed;
    if funds_confirmed && !order.funds_confirmed {
        update.funds_confirmed = Some(true);
    }

    let mut target = mapping.status;
    if funds_confirmed && target == OrderStatus::Delivered {
        target = OrderStatus::Completed;
    }
    let target = forward_only(order.status, target);
    if target != order.status {
        update.status = Some(target);
        update.release_stock = target.releases_stock() && !order.status.releases_stock();
    }

    if let Some(text) = remote.status_text.as_deref()
        && order.remote_status_text.as_deref() != Some(text)
    {
        update.status_text = Some(text.to_string());
    }

    if let Some(fee) = remote.delivery_fee
        && order.delivery_fee != Some(fee)
    {
        update.delivery_fee = Some(fee);
    }

    // Remote id is only ever filled in, never replaced
    if order.remote_order_id.is_none() {
        update.remote_order_id.clone_from(&remote.remote_id);
    }

    if let (Some(stored_key), Some(stored_id), Some(remote_key)) = (
        &order.tracking_key,
        &order.remote_order_id,
        &remote.tracking_key,
    ) && stored_key.mirrors(stored_id)
        && stored_key != remote_key
    {
        update.tracking_key = Some(TrackingKeyRepair {
            previous: Some(stored_key.clone()),
            repaired: remote_key.clone(),
        });
    }

    update
}

/// Apply the non-regression rule to a proposed status.
///
/// - completed is final
/// - a status on the forward path never moves to an earlier one
/// - cancelled and returned may be entered from anything but completed
/// - cancelled and returned never go back onto the forward path, since their
///   stock has already been released
#[must_use]
pub fn forward_only(current: OrderStatus, proposed: OrderStatus) -> OrderStatus {
    if current == OrderStatus::Completed {
        return current;
    }
    match (current.progress_rank(), proposed.progress_rank()) {
        (Some(current_rank), Some(proposed_rank)) if proposed_rank < current_rank => current,
        (None, Some(_)) => current,
        _ => proposed,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use dispatch_sync_core::{DeliveryFee, OrderId, RemoteOrderId, TrackingKey, UserId};

    use super::*;

    fn local(key: &str, remote_id: Option<&str>, status: OrderStatus) -> LocalOrder {
        LocalOrder {
            id: OrderId::new(1),
            owner_id: UserId::new(5),
            tracking_key: TrackingKey::parse(key),
            remote_order_id: remote_id.and_then(RemoteOrderId::parse),
            status,
            remote_status_text: None,
            funds_confirmed: false,
            delivery_fee: None,
            created_at: Utc::now(),
            provider: "default".to_string(),
        }
    }

    fn remote(id: &str, key: &str, code: Option<&str>, text: Option<&str>) -> RemoteOrder {
        RemoteOrder {
            remote_id: RemoteOrderId::parse(id),
            tracking_key: TrackingKey::parse(key),
            alias_tracking_key: None,
            status_code: code.map(str::to_string),
            status_text: text.map(str::to_string),
            funds_confirmed: false,
            delivery_fee: None,
        }
    }

    fn catalog() -> HashMap<String, StatusMapping> {
        let mut catalog = HashMap::new();
        catalog.insert("4".to_string(), StatusMapping::of(OrderStatus::Delivered));
        catalog
    }

    fn update_of(result: Reconciliation) -> OrderUpdate {
        match result {
            Reconciliation::Update(update) => update,
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_key_match_repairs_remote_id() {
        let order = local("RY-1001", None, OrderStatus::Pending);
        let index = RemoteOrderIndex::build(vec![remote("88001", "RY-1001", Some("4"), None)]);

        let update = update_of(reconcile(&order, &index, &catalog()));
        assert_eq!(update.status, Some(OrderStatus::Delivered));
        assert_eq!(update.remote_order_id, RemoteOrderId::parse("88001"));
        assert!(!update.release_stock);
    }

    #[test]
    fn test_unmatched_order_is_deletion_candidate() {
        let order = local("RY-404", None, OrderStatus::Pending);
        let index = RemoteOrderIndex::build(vec![remote("1", "RY-1", None, None)]);
        assert_eq!(
            reconcile(&order, &index, &catalog()),
            Reconciliation::DeletionCandidate
        );
    }

    #[test]
    fn test_second_reconcile_is_noop() {
        let mut order = local("RY-1", None, OrderStatus::Pending);
        let mut record = remote("9", "RY-1", Some("4"), Some("Delivered"));
        record.delivery_fee = DeliveryFee::new(rust_decimal::Decimal::new(5000, 0));
        record.funds_confirmed = true;
        let index = RemoteOrderIndex::build(vec![record]);

        let update = update_of(reconcile(&order, &index, &catalog()));
        update.apply_to(&mut order);

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(reconcile(&order, &index, &catalog()), Reconciliation::NoOp);
    }

    #[test]
    fn test_funds_confirmation_promotes_delivered() {
        let order = local("RY-1", Some("9"), OrderStatus::Delivered);
        let mut record = remote("9", "RY-1", None, None);
        record.status_text = Some("Delivered".to_string());
        record.funds_confirmed = true;
        let index = RemoteOrderIndex::build(vec![record]);

        let update = update_of(reconcile(&order, &index, &catalog()));
        assert_eq!(update.status, Some(OrderStatus::Completed));
        assert_eq!(update.funds_confirmed, Some(true));
    }

    #[test]
    fn test_status_never_regresses() {
        let order = local("RY-1", Some("9"), OrderStatus::Delivered);
        let index = RemoteOrderIndex::build(vec![remote("9", "RY-1", None, Some("In transit"))]);

        let update = update_of(reconcile(&order, &index, &catalog()));
        assert_eq!(update.status, None);
        assert_eq!(update.status_text.as_deref(), Some("In transit"));

        let completed = local("RY-1", Some("9"), OrderStatus::Completed);
        let index = RemoteOrderIndex::build(vec![remote("9", "RY-1", Some("4"), None)]);
        assert_eq!(reconcile(&completed, &index, &catalog()), Reconciliation::NoOp);
    }

    #[test]
    fn test_return_releases_stock_once() {
        let order = local("RY-1", Some("9"), OrderStatus::Delivery);
        let index =
            RemoteOrderIndex::build(vec![remote("9", "RY-1", None, Some("Returned to merchant"))]);
        let update = update_of(reconcile(&order, &index, &catalog()));
        assert_eq!(update.status, Some(OrderStatus::Returned));
        assert!(update.release_stock);

        let cancelled = local("RY-1", Some("9"), OrderStatus::Returned);
        let index = RemoteOrderIndex::build(vec![remote("9", "RY-1", None, Some("Cancelled"))]);
        let update = update_of(reconcile(&cancelled, &index, &catalog()));
        assert_eq!(update.status, Some(OrderStatus::Cancelled));
        assert!(!update.release_stock);
    }

    #[test]
    fn test_mirrored_tracking_key_is_repaired() {
        let order = local("55120", Some("55120"), OrderStatus::Pending);
        let index = RemoteOrderIndex::build(vec![remote("55120", "RY-7781", None, None)]);

        let update = update_of(reconcile(&order, &index, &catalog()));
        let repair = update.tracking_key.expect("repair");
        assert_eq!(repair.previous, TrackingKey::parse("55120"));
        assert_eq!(repair.repaired.as_str(), "RY-7781");
        assert_eq!(update.remote_order_id, None);
    }

    #[test]
    fn test_fee_only_written_when_changed() {
        let mut order = local("RY-1", Some("9"), OrderStatus::Pending);
        order.delivery_fee = DeliveryFee::new(rust_decimal::Decimal::new(5000, 0));
        let mut record = remote("9", "RY-1", None, None);
        record.delivery_fee = DeliveryFee::new(rust_decimal::Decimal::new(5000, 0));
        let index = RemoteOrderIndex::build(vec![record]);

        assert_eq!(reconcile(&order, &index, &catalog()), Reconciliation::NoOp);
    }

    #[test]
    fn test_forward_only_rules() {
        use OrderStatus::{Cancelled, Completed, Delivered, Delivery, Pending, Returned, Shipped};
        assert_eq!(forward_only(Delivered, Pending), Delivered);
        assert_eq!(forward_only(Delivery, Shipped), Delivery);
        assert_eq!(forward_only(Completed, Returned), Completed);
        assert_eq!(forward_only(Delivered, Returned), Returned);
        assert_eq!(forward_only(Pending, Delivered), Delivered);
        assert_eq!(forward_only(Returned, Pending), Returned);
        assert_eq!(forward_only(Returned, Delivery), Returned);
        assert_eq!(forward_only(Cancelled, Delivered), Cancelled);
        assert_eq!(forward_only(Returned, Cancelled), Cancelled);
    }

    #[test]
    fn test_returned_order_stays_off_delivery_path() {
        let returned = local("RY-1", Some("9"), OrderStatus::Returned);
        let index = RemoteOrderIndex::build(vec![remote("9", "RY-1", None, Some("In transit"))]);

        let update = update_of(reconcile(&returned, &index, &catalog()));
        assert_eq!(update.status, None);
        assert!(!update.release_stock);
        assert_eq!(update.status_text.as_deref(), Some("In transit"));
    }
}
