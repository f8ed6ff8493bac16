//! Sweeps against the fake provider: matching, status mapping, stock release.

use chrono::Duration;

use dispatch_sync_core::{OrderId, OrderStatus, RemoteOrderId, StaffRole, TrackingKey, UserId};
use dispatch_sync_integration_tests::{Harness, credential, fee, order, remote};
use dispatch_sync_server::sync::{Actor, SyncEvent};

fn staff(id: i32) -> Actor {
    Actor::new(UserId::new(id), StaffRole::Staff)
}

fn with_account(harness: &Harness, owner: i32, token: &str) {
    harness.credentials.insert(credential(
        owner * 10,
        owner,
        "ali",
        token,
        Duration::days(1),
        true,
    ));
}

// =============================================================================
// Matching and status mapping
// =============================================================================

#[tokio::test]
async fn test_catalog_code_updates_status_and_fills_remote_id() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");
    harness.provider.status("4", "Delivered");

    harness
        .orders
        .insert(order(1, 7, "RY-1001", Duration::hours(2)));
    let mut listed = remote("88123", "RY-1001", "");
    listed.status_text = None;
    listed.status_code = Some("4".to_string());
    harness.provider.list("tok_a", listed);

    let engine = harness.engine(staff(7));
    let report = engine.fast_sync(false).await.expect("sweep");

    let stored = harness.orders.get(1).expect("order kept");
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.remote_order_id, RemoteOrderId::parse("88123"));
    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 0);
}

#[tokio::test]
async fn test_returned_text_releases_reserved_stock() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    let mut local = order(2, 7, "RY-2002", Duration::hours(2));
    local.status = OrderStatus::Shipped;
    harness.orders.insert(local);
    harness.orders.reserve(OrderId::new(2), 501, 3);
    let mut listed = remote("88200", "RY-2002", "returned to merchant");
    listed.status_code = Some("99".to_string());
    harness.provider.list("tok_a", listed);

    let engine = harness.engine(staff(7));
    engine.fast_sync(false).await.expect("sweep");
    engine.flush_events().await;

    assert_eq!(
        harness.orders.get(2).map(|o| o.status),
        Some(OrderStatus::Returned)
    );
    assert_eq!(harness.orders.reserved(501), 0);
    assert_eq!(harness.events.count("stock_released"), 1);
}

#[tokio::test]
async fn test_second_sweep_does_not_release_stock_again() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    harness
        .orders
        .insert(order(3, 7, "RY-3003", Duration::hours(2)));
    harness.orders.reserve(OrderId::new(3), 601, 2);
    harness
        .provider
        .list("tok_a", remote("88300", "RY-3003", "cancelled by customer"));

    let engine = harness.engine(staff(7));
    engine.fast_sync(false).await.expect("first sweep");
    // Cancelled orders are outside the fast sweep; a correction revisits them
    engine
        .comprehensive_correction()
        .await
        .expect("correction")
        .expect("first correction runs");
    engine.flush_events().await;

    assert_eq!(harness.orders.reserved(601), 0);
    assert_eq!(harness.events.count("stock_released"), 1);
}

#[tokio::test]
async fn test_returned_order_flapping_back_to_transit_keeps_other_reservations() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    let mut flapping = order(1, 7, "RY-1101", Duration::hours(2));
    flapping.status = OrderStatus::Delivery;
    harness.orders.insert(flapping);
    harness.orders.reserve(OrderId::new(1), 42, 5);
    harness
        .orders
        .insert(order(2, 7, "RY-1102", Duration::hours(2)));
    harness.orders.reserve(OrderId::new(2), 42, 5);

    let steady = remote("88102", "RY-1102", "pending");
    let engine = harness.engine(staff(7));
    for text in ["Returned to merchant", "In transit", "Returned to merchant"] {
        harness.provider.set_listing(
            "tok_a",
            vec![remote("88101", "RY-1101", text), steady.clone()],
        );
        engine.fast_sync(false).await.expect("sweep");
    }
    engine.flush_events().await;

    let stored = harness.orders.get(1).expect("order kept");
    assert_eq!(stored.status, OrderStatus::Returned);
    assert_eq!(harness.orders.reserved(42), 5);
    assert_eq!(harness.events.count("stock_released"), 1);
    assert_eq!(
        harness.orders.get(2).map(|o| o.status),
        Some(OrderStatus::Pending)
    );
}

#[tokio::test]
async fn test_fee_and_text_changes_publish_order_update() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    harness
        .orders
        .insert(order(4, 7, "RY-4004", Duration::hours(2)));
    let mut listed = remote("88400", "RY-4004", "with courier");
    listed.delivery_fee = fee(5000);
    harness.provider.list("tok_a", listed);

    let engine = harness.engine(staff(7));
    engine.fast_sync(false).await.expect("sweep");
    engine.flush_events().await;

    let stored = harness.orders.get(4).expect("order kept");
    assert_eq!(stored.delivery_fee, fee(5000));
    assert_eq!(stored.remote_status_text.as_deref(), Some("with courier"));
    assert_eq!(harness.events.count("order_updated"), 1);
}

#[tokio::test]
async fn test_settled_delivery_becomes_completed_and_stays_completed() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    let mut local = order(5, 7, "RY-5005", Duration::days(3));
    local.status = OrderStatus::Delivered;
    harness.orders.insert(local);
    let mut listed = remote("88500", "RY-5005", "delivered");
    listed.funds_confirmed = true;
    harness.provider.list("tok_a", listed);

    let engine = harness.engine(staff(7));
    engine
        .comprehensive_correction()
        .await
        .expect("correction")
        .expect("first correction runs");

    let stored = harness.orders.get(5).expect("order kept");
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.funds_confirmed);
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    let mut delivered = order(6, 7, "RY-6006", Duration::days(3));
    delivered.status = OrderStatus::Delivered;
    harness.orders.insert(delivered);
    harness
        .provider
        .list("tok_a", remote("88600", "RY-6006", "awaiting pickup"));

    let mut completed = order(7, 7, "RY-7007", Duration::days(3));
    completed.status = OrderStatus::Completed;
    harness.orders.insert(completed);
    harness
        .provider
        .list("tok_a", remote("88700", "RY-7007", "returned"));

    let engine = harness.engine(staff(7));
    engine
        .comprehensive_correction()
        .await
        .expect("correction")
        .expect("first correction runs");

    assert_eq!(
        harness.orders.get(6).map(|o| o.status),
        Some(OrderStatus::Delivered)
    );
    assert_eq!(
        harness.orders.get(7).map(|o| o.status),
        Some(OrderStatus::Completed)
    );
}

#[tokio::test]
async fn test_mirrored_tracking_key_is_repaired_and_recorded() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");

    let mut local = order(8, 7, "88800", Duration::hours(2));
    local.remote_order_id = RemoteOrderId::parse("88800");
    harness.orders.insert(local);
    harness
        .provider
        .list("tok_a", remote("88800", "RY-8008", "pending"));

    let engine = harness.engine(staff(7));
    engine.fast_sync(false).await.expect("sweep");
    engine.flush_events().await;

    assert_eq!(
        harness.orders.get(8).and_then(|o| o.tracking_key),
        TrackingKey::parse("RY-8008")
    );
    assert_eq!(harness.events.count("tracking_key_repaired"), 1);
}

// =============================================================================
// Owners and accounts
// =============================================================================

#[tokio::test]
async fn test_each_owner_is_swept_with_their_own_account() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_seven");
    with_account(&harness, 8, "tok_eight");

    harness
        .orders
        .insert(order(1, 7, "RY-1", Duration::hours(2)));
    harness
        .orders
        .insert(order(2, 8, "RY-2", Duration::hours(2)));
    harness
        .provider
        .list("tok_seven", remote("1", "RY-1", "delivered"));
    // Listed under the wrong account: must not be matched for owner 7
    harness
        .provider
        .list("tok_seven", remote("2", "RY-2", "delivered"));
    harness
        .provider
        .list("tok_eight", remote("2", "RY-2", "shipped out"));

    let manager = Actor::new(UserId::new(1), StaffRole::Manager);
    let engine = harness.engine(manager);
    let report = engine.fast_sync(false).await.expect("sweep");

    assert_eq!(report.checked, 2);
    assert_eq!(harness.provider.listing_calls(), 2);
    assert_eq!(
        harness.orders.get(1).map(|o| o.status),
        Some(OrderStatus::Delivered)
    );
    assert_ne!(
        harness.orders.get(2).map(|o| o.status),
        Some(OrderStatus::Delivered)
    );
}

#[tokio::test]
async fn test_staff_sweep_only_covers_own_orders() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_seven");
    with_account(&harness, 8, "tok_eight");
    harness
        .orders
        .insert(order(1, 7, "RY-1", Duration::hours(2)));
    harness
        .orders
        .insert(order(2, 8, "RY-2", Duration::hours(2)));
    harness
        .provider
        .list("tok_eight", remote("2", "RY-2", "delivered"));

    let engine = harness.engine(staff(7));
    let report = engine.fast_sync(false).await.expect("sweep");

    assert_eq!(report.checked, 1);
    assert_eq!(
        harness.orders.get(2).map(|o| o.status),
        Some(OrderStatus::Pending)
    );
}

#[tokio::test]
async fn test_owner_without_usable_account_is_skipped() {
    let harness = Harness::new();
    harness.credentials.insert(credential(
        70,
        7,
        "ali",
        "tok_old",
        Duration::hours(-1),
        true,
    ));
    harness
        .orders
        .insert(order(1, 7, "RY-1", Duration::hours(2)));

    let engine = harness.engine(staff(7));
    let report = engine.fast_sync(false).await.expect("sweep");

    assert_eq!(report.skipped_owners, 1);
    assert_eq!(report.checked, 0);
    assert_eq!(harness.provider.listing_calls(), 0);
    assert!(harness.orders.get(1).is_some());
}

#[tokio::test]
async fn test_failed_listing_skips_owner_without_deleting() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");
    harness.provider.fail_listing("tok_a");
    harness
        .orders
        .insert(order(1, 7, "RY-1", Duration::hours(2)));

    let engine = harness.engine(staff(7));
    let report = engine.fast_sync(false).await.expect("sweep");

    assert_eq!(report.skipped_owners, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(harness.provider.lookup_calls(), 0);
    assert_eq!(harness.orders.len(), 1);
}

#[tokio::test]
async fn test_notifications_follow_the_trigger() {
    let harness = Harness::new();
    with_account(&harness, 7, "tok_a");
    harness
        .orders
        .insert(order(1, 7, "RY-1", Duration::hours(2)));
    harness
        .provider
        .list("tok_a", remote("1", "RY-1", "delivered"));

    let engine = harness.engine(staff(7));
    engine.fast_sync(true).await.expect("sweep");
    engine.flush_events().await;

    assert!(harness.events.events().iter().any(|event| matches!(
        event,
        SyncEvent::StatusChanged {
            to: OrderStatus::Delivered,
            notify: true,
            ..
        }
    )));
    assert_eq!(harness.events.count("status_notification"), 1);
}
