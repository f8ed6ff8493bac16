//! Engine events and the per-session event bus.
//!
//! The engine publishes [`SyncEvent`]s without waiting on persistence. A
//! single dispatch loop per session drains them in publish order into the
//! [`EventSink`], routing status changes through the [`StatusNotifier`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use dispatch_sync_core::{OrderId, OrderStatus, RemoteOrderId, TrackingKey, UserId};

use super::notifier::StatusNotifier;
use super::sweep::{SweepMode, SweepReport};
use crate::db::EventSink;
use crate::models::StockRelease;

/// Something the engine did or observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Non-status fields of an order were updated.
    OrderUpdated {
        order_id: OrderId,
        owner_id: UserId,
        tracking_key: Option<TrackingKey>,
    },
    /// The canonical status of an order changed.
    StatusChanged {
        order_id: OrderId,
        owner_id: UserId,
        tracking_key: Option<TrackingKey>,
        from: OrderStatus,
        to: OrderStatus,
        /// Whether the triggering sweep asked for user notifications.
        notify: bool,
    },
    /// A user-facing status notification that survived coalescing.
    StatusNotification {
        order_id: OrderId,
        owner_id: UserId,
        tracking_key: TrackingKey,
        status: OrderStatus,
    },
    /// A tracking key equal to its own remote id was replaced. Heuristic,
    /// kept for audit.
    TrackingKeyRepaired {
        order_id: OrderId,
        owner_id: UserId,
        previous: Option<TrackingKey>,
        repaired: TrackingKey,
        remote_id: Option<RemoteOrderId>,
    },
    /// Reserved stock was released by a cancellation or return.
    StockReleased {
        order_id: OrderId,
        owner_id: UserId,
        items: Vec<StockRelease>,
    },
    /// An order missing at the provider was verified gone and deleted.
    DeletionConfirmed {
        order_id: OrderId,
        owner_id: UserId,
        tracking_key: Option<TrackingKey>,
        released: Vec<StockRelease>,
    },
    /// A sweep finished.
    SweepCompleted {
        actor: UserId,
        mode: SweepMode,
        report: SweepReport,
    },
    /// A sweep failed as a whole.
    SweepFailed {
        actor: UserId,
        mode: SweepMode,
        reason: String,
    },
    /// The one-time full-history correction finished.
    CorrectionCompleted { actor: UserId, report: SweepReport },
}

impl SyncEvent {
    /// Stable event name as stored in the event log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderUpdated { .. } => "order_updated",
            Self::StatusChanged { .. } => "status_changed",
            Self::StatusNotification { .. } => "status_notification",
            Self::TrackingKeyRepaired { .. } => "tracking_key_repaired",
            Self::StockReleased { .. } => "stock_released",
            Self::DeletionConfirmed { .. } => "deletion_confirmed",
            Self::SweepCompleted { .. } => "sweep_completed",
            Self::SweepFailed { .. } => "sweep_failed",
            Self::CorrectionCompleted { .. } => "correction_completed",
        }
    }

    /// Order the event concerns, if any.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::OrderUpdated { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::StatusNotification { order_id, .. }
            | Self::TrackingKeyRepaired { order_id, .. }
            | Self::StockReleased { order_id, .. }
            | Self::DeletionConfirmed { order_id, .. } => Some(*order_id),
            Self::SweepCompleted { .. }
            | Self::SweepFailed { .. }
            | Self::CorrectionCompleted { .. } => None,
        }
    }

    /// User the event belongs to: the order owner or the sweeping actor.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::OrderUpdated { owner_id, .. }
            | Self::StatusChanged { owner_id, .. }
            | Self::StatusNotification { owner_id, .. }
            | Self::TrackingKeyRepaired { owner_id, .. }
            | Self::StockReleased { owner_id, .. }
            | Self::DeletionConfirmed { owner_id, .. } => *owner_id,
            Self::SweepCompleted { actor, .. }
            | Self::SweepFailed { actor, .. }
            | Self::CorrectionCompleted { actor, .. } => *actor,
        }
    }
}

enum BusMessage {
    Event(Box<SyncEvent>),
    Flush(oneshot::Sender<()>),
}

/// Handle for publishing events onto a session's bus.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl EventPublisher {
    /// Publish an event. Events published after the bus was unsubscribed are
    /// dropped.
    pub fn publish(&self, event: SyncEvent) {
        if self.tx.send(BusMessage::Event(Box::new(event))).is_err() {
            warn!("Event bus closed, dropping event");
        }
    }

    /// Wait until every event published before this call was dispatched.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(BusMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// The running dispatch loop. Dropping it unsubscribes.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop dispatching. Undelivered events are discarded.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    /// Whether the loop has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Single-consumer event bus.
pub struct EventBus;

impl EventBus {
    /// Spawn the dispatch loop for one session.
    #[must_use]
    pub fn start(
        sink: Arc<dyn EventSink>,
        notifier: StatusNotifier,
    ) -> (EventPublisher, Subscription) {
        let (tx, mut rx) = mpsc::unbounded_channel::<BusMessage>();

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    BusMessage::Event(event) => dispatch(sink.as_ref(), &notifier, *event).await,
                    BusMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        (EventPublisher { tx }, Subscription { handle })
    }
}

async fn dispatch(sink: &dyn EventSink, notifier: &StatusNotifier, event: SyncEvent) {
    let notification = if let SyncEvent::StatusChanged {
        order_id,
        owner_id,
        tracking_key: Some(tracking_key),
        to,
        notify: true,
        ..
    } = &event
        && notifier.admit(tracking_key).await
    {
        Some(SyncEvent::StatusNotification {
            order_id: *order_id,
            owner_id: *owner_id,
            tracking_key: tracking_key.clone(),
            status: *to,
        })
    } else {
        None
    };

    for event in std::iter::once(event).chain(notification) {
        if let Err(e) = sink.append(&event).await {
            warn!(kind = event.kind(), error = %e, "Failed to record sync event");
        }
    }
}
