//! Multi-account sweep coordination.
//!
//! A sweep partitions local orders by owner and reconciles each partition
//! with that owner's own provider account, so one staff member's token is
//! never used against another's orders. Owners are processed one after the
//! other; provider rate limits are per account and volumes are modest.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use dispatch_sync_core::{OrderStatus, UserId};

use super::catalog::StatusCatalog;
use super::events::{EventPublisher, SyncEvent};
use super::guard::{DeletionGuard, GuardContext, check_eligibility};
use super::index::RemoteOrderIndex;
use super::reconciler::{Reconciliation, reconcile};
use super::SyncError;
use crate::config::EngineSettings;
use crate::db::{OrderStore, RepositoryError};
use crate::models::{LocalOrder, OrderFilter, OrderUpdate};
use crate::provider::DeliveryProvider;
use crate::services::AccountService;

/// Which pass a sweep belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Orders still in flight, followed by the deletion pass.
    Fast,
    /// Entire order history, once.
    Correction,
    /// Deletable orders only, to find deletion candidates.
    DeletionPass,
}

impl SweepMode {
    /// Statuses of local orders the sweep covers. `None` means all.
    #[must_use]
    pub fn statuses(self) -> Option<Vec<OrderStatus>> {
        match self {
            Self::Fast => Some(OrderStatus::FAST_SYNC.to_vec()),
            Self::Correction => None,
            Self::DeletionPass => Some(OrderStatus::DELETABLE.to_vec()),
        }
    }
}

/// Aggregate outcome of a sweep. Only counts are surfaced to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Local orders compared against a remote listing.
    pub checked: u32,
    /// Orders written.
    pub updated: u32,
    /// Orders with no remote match.
    pub deletion_candidates: u32,
    /// Orders verified gone and deleted.
    pub deleted: u32,
    /// Owners skipped for lack of a usable token or a failed listing.
    pub skipped_owners: u32,
    /// Per-order failures.
    pub failed: u32,
}

impl SweepReport {
    /// Fold another report into this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.checked += other.checked;
        self.updated += other.updated;
        self.deletion_candidates += other.deletion_candidates;
        self.deleted += other.deleted;
        self.skipped_owners += other.skipped_owners;
        self.failed += other.failed;
    }
}

/// Result of one sweep before the deletion pass.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Counts so far.
    pub report: SweepReport,
    /// Unmatched orders, for the deletion guard.
    pub candidates: Vec<LocalOrder>,
}

/// Everything a sweep needs, shared by every pass of one engine.
#[derive(Clone)]
pub struct Sweeper {
    pub(crate) orders: Arc<dyn OrderStore>,
    pub(crate) accounts: AccountService,
    pub(crate) provider: Arc<dyn DeliveryProvider>,
    pub(crate) catalog: Arc<StatusCatalog>,
    pub(crate) guard: Arc<DeletionGuard>,
    pub(crate) events: EventPublisher,
    pub(crate) settings: Arc<EngineSettings>,
}

impl Sweeper {
    /// Reconcile every local order in scope.
    ///
    /// `owner` restricts the sweep to one owner's orders; `None` sweeps every
    /// owner, each with their own account.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Repository` only if local orders cannot be listed.
    /// Per-owner and per-order failures are counted, not returned.
    #[instrument(skip(self), fields(provider = %self.settings.provider_name))]
    pub async fn sweep(
        &self,
        mode: SweepMode,
        owner: Option<UserId>,
        notify: bool,
    ) -> Result<SweepOutcome, SyncError> {
        let filter = OrderFilter {
            provider: self.settings.provider_name.clone(),
            owner,
            statuses: mode.statuses(),
        };
        let orders = self.orders.list_orders(&filter).await?;

        let mut by_owner: BTreeMap<UserId, Vec<LocalOrder>> = BTreeMap::new();
        for order in orders {
            by_owner.entry(order.owner_id).or_default().push(order);
        }

        let mut outcome = SweepOutcome::default();
        for (owner, orders) in by_owner {
            self.sweep_owner(owner, orders, notify, &mut outcome).await;
        }

        info!(
            ?mode,
            checked = outcome.report.checked,
            updated = outcome.report.updated,
            candidates = outcome.report.deletion_candidates,
            skipped_owners = outcome.report.skipped_owners,
            failed = outcome.report.failed,
            "Sweep finished"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, orders, outcome), fields(owner = %owner, orders = orders.len()))]
    async fn sweep_owner(
        &self,
        owner: UserId,
        orders: Vec<LocalOrder>,
        notify: bool,
        outcome: &mut SweepOutcome,
    ) {
        let now = Utc::now();
        let credential = match self.accounts.resolve(owner, None, now).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Skipping owner without a usable provider account");
                outcome.report.skipped_owners += 1;
                return;
            }
        };

        self.catalog
            .refresh_if_stale(self.provider.as_ref(), &credential.token)
            .await;

        let remote = match self.provider.list_merchant_orders(&credential.token).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "Skipping owner, remote order listing failed"
                );
                outcome.report.skipped_owners += 1;
                return;
            }
        };
        self.accounts.touch(&credential, now).await;

        let index = RemoteOrderIndex::build(remote);
        let catalog = self.catalog.snapshot().await;

        for order in orders {
            outcome.report.checked += 1;
            match reconcile(&order, &index, &catalog) {
                Reconciliation::Update(update) => {
                    match self.write_update(&order, &update, notify).await {
                        Ok(()) => outcome.report.updated += 1,
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "Failed to write order update");
                            outcome.report.failed += 1;
                        }
                    }
                }
                Reconciliation::DeletionCandidate => {
                    debug!(order_id = %order.id, "No remote match");
                    outcome.report.deletion_candidates += 1;
                    outcome.candidates.push(order);
                }
                Reconciliation::NoOp => {}
            }
        }
    }

    /// Persist one update and publish what changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn write_update(
        &self,
        order: &LocalOrder,
        update: &OrderUpdate,
        notify: bool,
    ) -> Result<(), RepositoryError> {
        let released = self.orders.apply_update(update).await?;

        if let Some(status) = update.status {
            self.events.publish(SyncEvent::StatusChanged {
                order_id: order.id,
                owner_id: order.owner_id,
                tracking_key: order.tracking_key.clone(),
                from: order.status,
                to: status,
                notify,
            });
        }
        if update.status_text.is_some()
            || update.delivery_fee.is_some()
            || update.funds_confirmed.is_some()
            || update.remote_order_id.is_some()
        {
            self.events.publish(SyncEvent::OrderUpdated {
                order_id: order.id,
                owner_id: order.owner_id,
                tracking_key: order.tracking_key.clone(),
            });
        }
        if let Some(repair) = &update.tracking_key {
            warn!(
                order_id = %order.id,
                previous = ?repair.previous,
                repaired = %repair.repaired,
                "Repaired tracking key that mirrored the remote id"
            );
            self.events.publish(SyncEvent::TrackingKeyRepaired {
                order_id: order.id,
                owner_id: order.owner_id,
                previous: repair.previous.clone(),
                repaired: repair.repaired.clone(),
                remote_id: order.remote_order_id.clone(),
            });
        }
        if !released.is_empty() {
            self.events.publish(SyncEvent::StockReleased {
                order_id: order.id,
                owner_id: order.owner_id,
                items: released,
            });
        }
        Ok(())
    }

    /// Run the deletion guard over unmatched orders and delete the ones
    /// verified gone. Returns the number deleted and the number of failures.
    #[instrument(skip(self, candidates), fields(actor = %actor, candidates = candidates.len()))]
    pub async fn delete_candidates(&self, actor: UserId, candidates: &[LocalOrder]) -> SweepReport {
        let mut report = SweepReport::default();

        for order in candidates {
            let now = Utc::now();
            let ctx = GuardContext {
                provider: &self.settings.provider_name,
                actor,
                now,
                grace: self.settings.deletion_grace,
            };
            if let Err(rejection) = check_eligibility(order, &ctx) {
                debug!(order_id = %order.id, %rejection, "Deletion not eligible");
                continue;
            }

            let credentials = match self.accounts.credentials_of(order.owner_id).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Could not load owner accounts");
                    report.failed += 1;
                    continue;
                }
            };

            if let Err(rejection) = self.guard.verify_gone(order, &credentials, now).await {
                debug!(order_id = %order.id, %rejection, "Deletion rejected by verification");
                continue;
            }

            match self.orders.delete_releasing_stock(order).await {
                Ok(released) => {
                    info!(
                        order_id = %order.id,
                        tracking_key = %order.display_key(),
                        released_items = released.len(),
                        "Deleted order missing at provider"
                    );
                    report.deleted += 1;
                    self.events.publish(SyncEvent::DeletionConfirmed {
                        order_id: order.id,
                        owner_id: order.owner_id,
                        tracking_key: order.tracking_key.clone(),
                        released,
                    });
                }
                Err(RepositoryError::NotFound) => {
                    debug!(order_id = %order.id, "Order already gone locally");
                }
                Err(RepositoryError::Changed) => {
                    info!(order_id = %order.id, "Order changed during verification, kept");
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Failed to delete order");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
