//! Engine phases, overlap rejection, the periodic timer and sessions.

use std::time::Duration;

use rust_decimal::Decimal;

use dispatch_sync_core::{OrderId, OrderStatus, RemoteOrderId, StaffRole, UserId};
use dispatch_sync_integration_tests::{Harness, credential, engine_settings, order, remote};
use dispatch_sync_server::provider::CreateOrderPayload;
use dispatch_sync_server::sync::{
    Actor, SessionRegistry, SingleOrderSync, SyncError, SyncPhase,
};

fn staff(id: i32) -> Actor {
    Actor::new(UserId::new(id), StaffRole::Staff)
}

fn seeded() -> Harness {
    let harness = Harness::new();
    harness.credentials.insert(credential(
        1,
        7,
        "ali",
        "tok_a",
        chrono::Duration::days(1),
        true,
    ));
    harness
        .orders
        .insert(order(1, 7, "RY-1", chrono::Duration::hours(1)));
    harness
        .provider
        .list("tok_a", remote("501", "RY-1", "out for delivery"));
    harness
}

fn payload() -> CreateOrderPayload {
    CreateOrderPayload {
        client_name: "Zainab".to_string(),
        client_phone: "07700000000".to_string(),
        city_id: "1".to_string(),
        region_id: "10".to_string(),
        location: "Street 12".to_string(),
        price: Decimal::from(25_000),
        items_number: 1,
        notes: None,
        merchant_reference: "local-9".to_string(),
    }
}

// =============================================================================
// Phases
// =============================================================================

#[tokio::test]
async fn test_sync_returns_to_standby_and_records_completion() {
    let harness = seeded();
    let engine = harness.engine(staff(7));
    assert!(engine.snapshot().phase.is_standby());

    engine.fast_sync(false).await.expect("sweep");
    engine.flush_events().await;

    let snapshot = engine.snapshot();
    assert!(snapshot.phase.is_standby());
    assert!(snapshot.last_sync_at.is_some());
    assert_eq!(harness.events.count("sweep_completed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_trigger_is_rejected() {
    let harness = seeded();
    harness.provider.delay_listings(Duration::from_secs(5));
    let engine = harness.engine(staff(7));

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.fast_sync(false).await }
    });
    while engine.snapshot().phase.is_standby() {
        tokio::task::yield_now().await;
    }

    let second = engine.fast_sync(false).await;
    assert!(matches!(second, Err(SyncError::ConcurrentSweepRejected)));
    let correction = engine.comprehensive_correction().await;
    assert!(matches!(
        correction,
        Err(SyncError::ConcurrentSweepRejected)
    ));

    running.await.expect("join").expect("first sweep");
    assert!(engine.snapshot().phase.is_standby());
    assert_eq!(harness.provider.listing_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_is_visible_before_sweep() {
    let harness = seeded();
    let mut settings = engine_settings();
    settings.countdown = Duration::from_secs(3);
    let engine = harness.engine_with(staff(7), settings);

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.fast_sync(false).await }
    });
    while engine.snapshot().phase.is_standby() {
        tokio::task::yield_now().await;
    }

    let snapshot = engine.snapshot();
    assert!(matches!(snapshot.phase, SyncPhase::Countdown { .. }));
    assert_eq!(snapshot.countdown, Some(3));
    assert_eq!(harness.provider.listing_calls(), 0);

    running.await.expect("join").expect("sweep");
    assert_eq!(harness.provider.listing_calls(), 1);
}

// =============================================================================
// Correction
// =============================================================================

#[tokio::test]
async fn test_correction_runs_once_per_actor() {
    let harness = seeded();
    let engine = harness.engine(staff(7));

    let first = engine.comprehensive_correction().await.expect("correction");
    let second = engine.comprehensive_correction().await.expect("correction");
    engine.flush_events().await;

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(harness.events.count("correction_completed"), 1);

    // A new engine for the same actor sees the stored flag
    let again = harness.engine(staff(7));
    assert!(
        again
            .comprehensive_correction()
            .await
            .expect("correction")
            .is_none()
    );
}

#[tokio::test(start_paused = true)]
async fn test_correction_started_during_another_does_not_repeat() {
    let harness = seeded();
    harness.flags.delay_reads(Duration::from_secs(1));
    let engine = harness.engine(staff(7));

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.comprehensive_correction().await }
    });
    // Reads the flag before the first correction stores it
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.comprehensive_correction().await }
    });

    let first = first.await.expect("join").expect("first correction");
    let second = second.await.expect("join").expect("second correction");
    engine.flush_events().await;

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(harness.provider.listing_calls(), 1);
    assert_eq!(harness.events.count("correction_completed"), 1);
}

// =============================================================================
// Periodic timer
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_periodic_timer_triggers_and_stops() {
    let harness = seeded();
    let mut settings = engine_settings();
    settings.sync_interval = Duration::from_secs(60);
    let engine = harness.engine_with(staff(7), settings);

    engine.set_periodic(true);
    assert!(engine.snapshot().periodic_enabled);
    assert_eq!(harness.provider.listing_calls(), 0);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(harness.provider.listing_calls(), 1);

    engine.set_periodic(false);
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(harness.provider.listing_calls(), 1);
    assert!(!engine.snapshot().periodic_enabled);
}

// =============================================================================
// Single order and hand-off
// =============================================================================

#[tokio::test]
async fn test_single_order_sync_updates_owned_order() {
    let harness = seeded();
    let engine = harness.engine(staff(7));

    let outcome = engine
        .sync_order_by_tracking_key("RY-1")
        .await
        .expect("synced");

    assert_eq!(
        outcome,
        SingleOrderSync::Updated {
            order_id: OrderId::new(1),
            status: OrderStatus::Delivery,
        }
    );
    assert!(engine.snapshot().phase.is_standby());
}

#[tokio::test]
async fn test_single_order_sync_rejects_other_owner_for_staff() {
    let harness = seeded();
    let engine = harness.engine(staff(8));

    let result = engine.sync_order_by_tracking_key("RY-1").await;
    assert!(matches!(result, Err(SyncError::NotPermitted(_))));

    let manager = harness.engine(Actor::new(UserId::new(2), StaffRole::Manager));
    assert!(manager.sync_order_by_tracking_key("RY-1").await.is_ok());
}

#[tokio::test]
async fn test_single_order_missing_remotely_is_kept() {
    let harness = seeded();
    harness
        .orders
        .insert(order(2, 7, "RY-GONE", chrono::Duration::days(3)));
    let engine = harness.engine(staff(7));

    let outcome = engine
        .sync_order_by_tracking_key("RY-GONE")
        .await
        .expect("synced");

    assert_eq!(
        outcome,
        SingleOrderSync::MissingRemotely {
            order_id: OrderId::new(2)
        }
    );
    assert!(harness.orders.get(2).is_some());

    let unknown = engine.sync_order_by_tracking_key("RY-NOPE").await;
    assert!(matches!(unknown, Err(SyncError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_handoff_stores_identifiers_once() {
    let harness = seeded();
    harness
        .orders
        .insert(order(9, 7, "", chrono::Duration::minutes(1)));
    let engine = harness.engine(staff(7));

    let created = engine
        .handoff_order(OrderId::new(9), &payload())
        .await
        .expect("handed off");

    let stored = harness.orders.get(9).expect("order kept");
    assert_eq!(stored.remote_order_id, Some(created.remote_id.clone()));
    assert_eq!(stored.tracking_key, Some(created.tracking_key));
    assert!(RemoteOrderId::parse(created.remote_id.as_str()).is_some());

    let again = engine.handoff_order(OrderId::new(9), &payload()).await;
    assert!(matches!(again, Err(SyncError::AlreadyHandedOff(_))));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_session_registry_keeps_one_engine_per_actor() {
    let harness = seeded();
    let sessions = SessionRegistry::new(harness.deps(), engine_settings(), false);

    let first = sessions.engine(staff(7)).await;
    first.set_periodic(true);
    let second = sessions.engine(staff(7)).await;
    assert!(second.snapshot().periodic_enabled);
    assert_eq!(sessions.active().await, vec![staff(7)]);

    assert!(sessions.end(staff(7)).await);
    assert!(!sessions.end(staff(7)).await);
    assert!(sessions.active().await.is_empty());
}
