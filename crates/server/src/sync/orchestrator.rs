//! Per-session sync engine and its state machine.
//!
//! ```text
//! standby ──trigger──▶ countdown ──(ticks to 0)──▶ syncing ──finish──▶ standby
//! ```
//!
//! Triggers arriving outside standby are rejected. The return to standby is
//! performed by a drop guard, so a failed or panicking pass never leaves the
//! engine stuck in `syncing`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use dispatch_sync_core::{OrderId, OrderStatus, TrackingKey, UserId};

use super::catalog::StatusCatalog;
use super::events::{EventBus, Subscription, SyncEvent};
use super::guard::DeletionGuard;
use super::notifier::StatusNotifier;
use super::reconciler::diff;
use super::session::Actor;
use super::sweep::{SweepMode, SweepReport, Sweeper};
use super::SyncError;
use crate::config::EngineSettings;
use crate::db::{CredentialStore, EventSink, OrderStore, SettingsStore};
use crate::provider::{CreateOrderPayload, CreatedOrder, DeliveryProvider};
use crate::services::AccountService;

/// Settings key marking the one-time correction as done.
pub const CORRECTION_DONE_FLAG: &str = "comprehensive_correction_done";

// =============================================================================
// State machine
// =============================================================================

/// What started a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Login,
    Periodic,
    Manual,
    Correction,
    DeletionPass,
}

/// The engine's single source of truth about what it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncPhase {
    /// Idle, accepting triggers.
    Standby,
    /// Visible delay before work starts.
    Countdown {
        remaining_secs: u64,
        trigger: SyncTrigger,
    },
    /// A pass is running.
    Syncing {
        started_at: DateTime<Utc>,
        trigger: SyncTrigger,
    },
}

/// Inputs to [`SyncPhase::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Trigger {
        trigger: SyncTrigger,
        countdown_secs: u64,
    },
    Tick,
    Start(DateTime<Utc>),
    Finish,
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A trigger arrived while not in standby.
    #[error("a sync is already in progress")]
    Busy,
    /// Any other event out of place.
    #[error("cannot apply {event:?} in {phase:?}")]
    Unexpected { phase: SyncPhase, event: PhaseEvent },
}

impl SyncPhase {
    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Busy` for a trigger outside standby and
    /// `TransitionError::Unexpected` for any other disallowed event.
    pub fn transition(self, event: PhaseEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (
                Self::Standby,
                PhaseEvent::Trigger {
                    trigger,
                    countdown_secs,
                },
            ) => Ok(Self::Countdown {
                remaining_secs: countdown_secs,
                trigger,
            }),
            (Self::Countdown { .. } | Self::Syncing { .. }, PhaseEvent::Trigger { .. }) => {
                Err(TransitionError::Busy)
            }
            (
                Self::Countdown {
                    remaining_secs,
                    trigger,
                },
                PhaseEvent::Tick,
            ) if remaining_secs > 0 => Ok(Self::Countdown {
                remaining_secs: remaining_secs - 1,
                trigger,
            }),
            (
                Self::Countdown {
                    remaining_secs: 0,
                    trigger,
                },
                PhaseEvent::Start(started_at),
            ) => Ok(Self::Syncing {
                started_at,
                trigger,
            }),
            (Self::Countdown { .. } | Self::Syncing { .. }, PhaseEvent::Finish) => {
                Ok(Self::Standby)
            }
            (phase, event) => Err(TransitionError::Unexpected { phase, event }),
        }
    }

    /// Whether the engine accepts a trigger.
    #[must_use]
    pub const fn is_standby(self) -> bool {
        matches!(self, Self::Standby)
    }

    /// Seconds left in the countdown, if counting down.
    #[must_use]
    pub const fn countdown(self) -> Option<u64> {
        match self {
            Self::Countdown { remaining_secs, .. } => Some(remaining_secs),
            Self::Standby | Self::Syncing { .. } => None,
        }
    }
}

// =============================================================================
// Collaborators and results
// =============================================================================

/// Best-effort pass run after every fast sync, e.g. invoice reconciliation.
#[async_trait]
pub trait FundsReconciliation: Send + Sync {
    /// Reconcile funds for the orders an actor sees.
    async fn reconcile_funds(
        &self,
        actor: UserId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Shared collaborators an engine is built from.
#[derive(Clone)]
pub struct EngineDeps {
    pub orders: Arc<dyn OrderStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub events: Arc<dyn EventSink>,
    pub provider: Arc<dyn DeliveryProvider>,
    pub funds: Option<Arc<dyn FundsReconciliation>>,
}

/// Point-in-time view of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    #[serde(flatten)]
    pub phase: SyncPhase,
    pub countdown: Option<u64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub periodic_enabled: bool,
}

/// Result of syncing one order by tracking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SingleOrderSync {
    /// The order was updated; `status` is its status afterwards.
    Updated {
        order_id: OrderId,
        status: OrderStatus,
    },
    /// Already consistent.
    Unchanged { order_id: OrderId },
    /// The provider has no such order. Nothing is deleted.
    MissingRemotely { order_id: OrderId },
}

// =============================================================================
// Engine
// =============================================================================

struct EngineState {
    phase: SyncPhase,
    last_sync_at: Option<DateTime<Utc>>,
}

struct EngineInner {
    actor: Actor,
    settings: Arc<EngineSettings>,
    sweeper: Sweeper,
    flags: Arc<dyn SettingsStore>,
    funds: Option<Arc<dyn FundsReconciliation>>,
    state: Mutex<EngineState>,
    periodic_enabled: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the engine to standby when a pass ends, however it ends.
struct PhaseGuard<'a> {
    inner: &'a EngineInner,
}

impl PhaseGuard<'_> {
    fn advance(&self, event: PhaseEvent) {
        let mut state = lock(&self.inner.state);
        match state.phase.transition(event) {
            Ok(next) => state.phase = next,
            Err(e) => warn!(error = %e, "Ignoring out-of-order phase event"),
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.inner.state);
        state.phase = state
            .phase
            .transition(PhaseEvent::Finish)
            .unwrap_or(SyncPhase::Standby);
    }
}

impl EngineInner {
    fn begin(
        &self,
        trigger: SyncTrigger,
        countdown_secs: u64,
    ) -> Result<PhaseGuard<'_>, SyncError> {
        let mut state = lock(&self.state);
        match state.phase.transition(PhaseEvent::Trigger {
            trigger,
            countdown_secs,
        }) {
            Ok(next) => {
                state.phase = next;
                drop(state);
                Ok(PhaseGuard { inner: self })
            }
            Err(_) => {
                debug!(
                    ?trigger,
                    phase = ?state.phase,
                    "Sync already in progress, ignoring trigger"
                );
                Err(SyncError::ConcurrentSweepRejected)
            }
        }
    }

    async fn run_countdown(&self, guard: &PhaseGuard<'_>) {
        let remaining = lock(&self.state).phase.countdown().unwrap_or(0);
        for _ in 0..remaining {
            tokio::time::sleep(Duration::from_secs(1)).await;
            guard.advance(PhaseEvent::Tick);
        }
        guard.advance(PhaseEvent::Start(Utc::now()));
    }

    fn finish(&self, mode: SweepMode, result: &Result<SweepReport, SyncError>) {
        match result {
            Ok(report) => {
                lock(&self.state).last_sync_at = Some(Utc::now());
                self.sweeper.events.publish(SyncEvent::SweepCompleted {
                    actor: self.actor.id,
                    mode,
                    report: *report,
                });
            }
            Err(e) => {
                error!(?mode, error = %e, "Sync failed");
                self.sweeper.events.publish(SyncEvent::SweepFailed {
                    actor: self.actor.id,
                    mode,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn fast_pass(&self, notify: bool) -> Result<SweepReport, SyncError> {
        let outcome = self
            .sweeper
            .sweep(SweepMode::Fast, self.actor.sweep_scope(), notify)
            .await?;

        let mut report = outcome.report;
        report.absorb(
            &self
                .sweeper
                .delete_candidates(self.actor.id, &outcome.candidates)
                .await,
        );

        if let Some(funds) = &self.funds
            && let Err(e) = funds.reconcile_funds(self.actor.id).await
        {
            warn!(error = %e, "Funds reconciliation failed");
        }

        Ok(report)
    }

    async fn deletion_pass(&self) -> Result<SweepReport, SyncError> {
        let outcome = self
            .sweeper
            .sweep(SweepMode::DeletionPass, Some(self.actor.id), false)
            .await?;

        let mut report = outcome.report;
        report.absorb(
            &self
                .sweeper
                .delete_candidates(self.actor.id, &outcome.candidates)
                .await,
        );
        Ok(report)
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }
}

/// Sync engine for one signed-in actor.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Build an engine and start its event loop. Must be called within a
    /// Tokio runtime.
    #[must_use]
    pub fn new(actor: Actor, deps: EngineDeps, settings: EngineSettings) -> Self {
        let settings = Arc::new(settings);
        let (events, subscription) = EventBus::start(
            deps.events,
            StatusNotifier::new(settings.notify_min_interval),
        );

        let sweeper = Sweeper {
            orders: deps.orders,
            accounts: AccountService::new(deps.credentials, Arc::clone(&deps.provider)),
            catalog: Arc::new(StatusCatalog::new(settings.status_catalog_ttl)),
            guard: Arc::new(DeletionGuard::new(
                Arc::clone(&deps.provider),
                settings.deletion_settle,
                settings.deletion_retries,
            )),
            provider: deps.provider,
            events,
            settings: Arc::clone(&settings),
        };

        Self {
            inner: Arc::new(EngineInner {
                actor,
                settings,
                sweeper,
                flags: deps.settings,
                funds: deps.funds,
                state: Mutex::new(EngineState {
                    phase: SyncPhase::Standby,
                    last_sync_at: None,
                }),
                periodic_enabled: AtomicBool::new(false),
                timer: Mutex::new(None),
                subscription: Mutex::new(Some(subscription)),
            }),
        }
    }

    /// The actor this engine sweeps for.
    #[must_use]
    pub fn actor(&self) -> Actor {
        self.inner.actor
    }

    /// Credential operations for this engine's provider.
    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.sweeper.accounts
    }

    /// Current mode, countdown and last successful sync.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = lock(&self.inner.state);
        SyncSnapshot {
            phase: state.phase,
            countdown: state.phase.countdown(),
            last_sync_at: state.last_sync_at,
            periodic_enabled: self.inner.periodic_enabled.load(Ordering::SeqCst),
        }
    }

    /// Fast sync on manual request.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentSweepRejected` if a sync is already running, or
    /// the error that failed the sweep as a whole.
    pub async fn fast_sync(&self, show_notifications: bool) -> Result<SweepReport, SyncError> {
        self.trigger(SyncTrigger::Manual, show_notifications).await
    }

    /// Countdown, fast sweep, deletion pass, then funds reconciliation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fast_sync`].
    #[instrument(skip(self), fields(actor = %self.inner.actor.id, role = %self.inner.actor.role))]
    pub async fn trigger(
        &self,
        trigger: SyncTrigger,
        show_notifications: bool,
    ) -> Result<SweepReport, SyncError> {
        let inner = &*self.inner;
        let guard = inner.begin(trigger, inner.settings.countdown.as_secs())?;
        inner.run_countdown(&guard).await;

        let result = inner.fast_pass(show_notifications).await;
        inner.finish(SweepMode::Fast, &result);
        drop(guard);
        result
    }

    /// Reconcile the entire order history once. Returns `None` if it already
    /// ran for this actor.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentSweepRejected` if a sync is already running, or a
    /// repository error if the completion flag cannot be read or written.
    #[instrument(skip(self), fields(actor = %self.inner.actor.id))]
    pub async fn comprehensive_correction(&self) -> Result<Option<SweepReport>, SyncError> {
        let inner = &*self.inner;
        if inner
            .flags
            .get_flag(inner.actor.id, CORRECTION_DONE_FLAG)
            .await?
        {
            debug!("Comprehensive correction already done");
            return Ok(None);
        }

        let guard = inner.begin(SyncTrigger::Correction, 0)?;
        // A correction that finished since the first read must not run again
        if inner
            .flags
            .get_flag(inner.actor.id, CORRECTION_DONE_FLAG)
            .await?
        {
            debug!("Comprehensive correction finished concurrently");
            return Ok(None);
        }
        inner.run_countdown(&guard).await;

        let result = inner
            .sweeper
            .sweep(SweepMode::Correction, inner.actor.sweep_scope(), false)
            .await
            .map(|outcome| outcome.report);

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Comprehensive correction failed");
                inner.sweeper.events.publish(SyncEvent::SweepFailed {
                    actor: inner.actor.id,
                    mode: SweepMode::Correction,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        inner
            .flags
            .set_flag(inner.actor.id, CORRECTION_DONE_FLAG, true)
            .await?;
        lock(&inner.state).last_sync_at = Some(Utc::now());
        inner.sweeper.events.publish(SyncEvent::CorrectionCompleted {
            actor: inner.actor.id,
            report,
        });
        info!(
            checked = report.checked,
            updated = report.updated,
            "Comprehensive correction completed"
        );
        drop(guard);
        Ok(Some(report))
    }

    /// Sweep the actor's own deletable orders and delete the ones verified
    /// gone at the provider.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fast_sync`].
    #[instrument(skip(self), fields(actor = %self.inner.actor.id))]
    pub async fn perform_deletion_pass(&self) -> Result<SweepReport, SyncError> {
        let inner = &*self.inner;
        let guard = inner.begin(SyncTrigger::DeletionPass, 0)?;
        inner.run_countdown(&guard).await;

        let result = inner.deletion_pass().await;
        inner.finish(SweepMode::DeletionPass, &result);
        drop(guard);
        result
    }

    /// Reconcile one order right away, outside the state machine. A missing
    /// remote order is reported, never deleted.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` for an unknown key, `NotPermitted` for another
    /// owner's order in a staff session, and credential or provider errors.
    #[instrument(skip(self), fields(actor = %self.inner.actor.id))]
    pub async fn sync_order_by_tracking_key(
        &self,
        key: &str,
    ) -> Result<SingleOrderSync, SyncError> {
        let sweeper = &self.inner.sweeper;
        let key = TrackingKey::parse(key).ok_or_else(|| SyncError::OrderNotFound(key.to_string()))?;

        let order = sweeper
            .orders
            .find_by_tracking_key(&self.inner.settings.provider_name, &key)
            .await?
            .ok_or_else(|| SyncError::OrderNotFound(key.to_string()))?;
        if !self.inner.actor.may_sync(order.owner_id) {
            return Err(SyncError::NotPermitted(order.id));
        }

        let now = Utc::now();
        let credential = sweeper.accounts.resolve(order.owner_id, None, now).await?;
        sweeper
            .catalog
            .refresh_if_stale(sweeper.provider.as_ref(), &credential.token)
            .await;
        let remote = sweeper
            .provider
            .get_order_by_tracking_key(&credential.token, &key)
            .await?;
        sweeper.accounts.touch(&credential, now).await;

        let Some(remote) = remote else {
            info!(order_id = %order.id, tracking_key = %key, "Order not found at provider");
            return Ok(SingleOrderSync::MissingRemotely { order_id: order.id });
        };

        let catalog = sweeper.catalog.snapshot().await;
        let update = diff(&order, &remote, &catalog);
        if update.is_empty() {
            return Ok(SingleOrderSync::Unchanged { order_id: order.id });
        }

        sweeper.write_update(&order, &update, true).await?;
        Ok(SingleOrderSync::Updated {
            order_id: order.id,
            status: update.resulting_status(),
        })
    }

    /// Create a local order at the provider and store the identifiers it
    /// was assigned.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound`, `NotPermitted`, `AlreadyHandedOff`, or the
    /// credential, provider or repository error that stopped the hand-off.
    #[instrument(skip(self, payload), fields(actor = %self.inner.actor.id))]
    pub async fn handoff_order(
        &self,
        order_id: OrderId,
        payload: &CreateOrderPayload,
    ) -> Result<CreatedOrder, SyncError> {
        let sweeper = &self.inner.sweeper;
        let order = sweeper
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| order.provider == self.inner.settings.provider_name)
            .ok_or_else(|| SyncError::OrderNotFound(order_id.to_string()))?;
        if !self.inner.actor.may_sync(order.owner_id) {
            return Err(SyncError::NotPermitted(order.id));
        }
        if order.remote_order_id.is_some() {
            return Err(SyncError::AlreadyHandedOff(order.id));
        }

        let now = Utc::now();
        let credential = sweeper.accounts.resolve(order.owner_id, None, now).await?;
        let created = sweeper
            .provider
            .create_order(&credential.token, payload)
            .await?;
        sweeper.accounts.touch(&credential, now).await;

        if !sweeper
            .orders
            .record_handoff(order.id, &created.remote_id, &created.tracking_key)
            .await?
        {
            warn!(
                order_id = %order.id,
                remote_id = %created.remote_id,
                "Order was handed off concurrently, keeping the stored identifiers"
            );
            return Err(SyncError::AlreadyHandedOff(order.id));
        }

        info!(
            order_id = %order.id,
            remote_id = %created.remote_id,
            tracking_key = %created.tracking_key,
            "Order handed off to provider"
        );
        sweeper.events.publish(SyncEvent::OrderUpdated {
            order_id: order.id,
            owner_id: order.owner_id,
            tracking_key: Some(created.tracking_key.clone()),
        });
        Ok(created)
    }

    /// Enable or disable the periodic timer. Disabling clears the timer; a
    /// countdown already under way finishes.
    pub fn set_periodic(&self, enabled: bool) {
        self.inner.periodic_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.start_periodic();
        } else if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
            info!(actor = %self.inner.actor.id, "Periodic sync stopped");
        }
    }

    fn start_periodic(&self) {
        let mut timer = lock(&self.inner.timer);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = self.inner.settings.sync_interval;
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.periodic_enabled.load(Ordering::SeqCst) {
                    continue;
                }
                let engine = Self { inner };
                tokio::spawn(async move {
                    match engine.trigger(SyncTrigger::Periodic, false).await {
                        Ok(_) | Err(SyncError::ConcurrentSweepRejected) => {}
                        Err(e) => warn!(error = %e, "Periodic sync failed"),
                    }
                });
            }
        }));
        info!(
            actor = %self.inner.actor.id,
            period_secs = period.as_secs(),
            "Periodic sync started"
        );
    }

    /// Wait until every event published so far reached the sink.
    pub async fn flush_events(&self) {
        self.inner.sweeper.events.flush().await;
    }

    /// Stop the timer and the event loop.
    pub fn shutdown(&self) {
        self.set_periodic(false);
        if let Some(subscription) = lock(&self.inner.subscription).take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countdown(remaining_secs: u64) -> SyncPhase {
        SyncPhase::Countdown {
            remaining_secs,
            trigger: SyncTrigger::Manual,
        }
    }

    #[test]
    fn test_full_cycle() {
        let started_at = Utc::now();
        let phase = SyncPhase::Standby
            .transition(PhaseEvent::Trigger {
                trigger: SyncTrigger::Manual,
                countdown_secs: 2,
            })
            .and_then(|p| p.transition(PhaseEvent::Tick))
            .and_then(|p| p.transition(PhaseEvent::Tick))
            .and_then(|p| p.transition(PhaseEvent::Start(started_at)));
        assert_eq!(
            phase,
            Ok(SyncPhase::Syncing {
                started_at,
                trigger: SyncTrigger::Manual
            })
        );
        assert_eq!(
            phase.and_then(|p| p.transition(PhaseEvent::Finish)),
            Ok(SyncPhase::Standby)
        );
    }

    #[test]
    fn test_trigger_outside_standby_is_busy() {
        let trigger = PhaseEvent::Trigger {
            trigger: SyncTrigger::Periodic,
            countdown_secs: 10,
        };
        assert_eq!(countdown(3).transition(trigger), Err(TransitionError::Busy));
        let syncing = SyncPhase::Syncing {
            started_at: Utc::now(),
            trigger: SyncTrigger::Manual,
        };
        assert_eq!(syncing.transition(trigger), Err(TransitionError::Busy));
    }

    #[test]
    fn test_countdown_cannot_start_early_or_tick_below_zero() {
        assert!(matches!(
            countdown(1).transition(PhaseEvent::Start(Utc::now())),
            Err(TransitionError::Unexpected { .. })
        ));
        assert!(matches!(
            countdown(0).transition(PhaseEvent::Tick),
            Err(TransitionError::Unexpected { .. })
        ));
        assert!(matches!(
            SyncPhase::Standby.transition(PhaseEvent::Finish),
            Err(TransitionError::Unexpected { .. })
        ));
    }

    #[test]
    fn test_countdown_only_reported_while_counting() {
        assert_eq!(countdown(4).countdown(), Some(4));
        assert_eq!(SyncPhase::Standby.countdown(), None);
    }

    #[test]
    fn test_snapshot_serializes_mode() {
        let snapshot = SyncSnapshot {
            phase: countdown(5),
            countdown: Some(5),
            last_sync_at: None,
            periodic_enabled: true,
        };
        let json = serde_json::to_value(snapshot).expect("json");
        assert_eq!(json["mode"], "countdown");
        assert_eq!(json["remaining_secs"], 5);
        assert_eq!(json["periodic_enabled"], true);
    }
}
