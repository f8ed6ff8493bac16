//! Gate in front of irreversible order deletion.
//!
//! An order missing from a remote listing may simply have been missed by an
//! incomplete query. Before such an order is deleted it must pass every
//! eligibility rule in [`check_eligibility`] and then a direct lookup under
//! every active account of its owner in [`DeletionGuard::verify_gone`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use dispatch_sync_core::{OrderStatus, TrackingKey, UserId};

use crate::models::{LocalOrder, ProviderCredential};
use crate::provider::DeliveryProvider;

/// Why an order was not deleted. An expected outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GuardRejection {
    /// The order belongs to a different provider than the sweep.
    #[error("order belongs to provider {provider}")]
    ProviderMismatch { provider: String },
    /// The provider already settled the order's funds.
    #[error("funds receipt is confirmed")]
    FundsConfirmed,
    /// Only pending, shipped and in-delivery orders are ever auto-deleted.
    #[error("status {status} is never auto-deleted")]
    StatusNotDeletable { status: OrderStatus },
    /// The order is younger than the grace period.
    #[error("order is younger than the grace period")]
    WithinGracePeriod,
    /// Nothing to look the order up by.
    #[error("order has no tracking identifier")]
    NoTrackingIdentifier,
    /// Only the owner's own session may delete an order.
    #[error("acting user {actor} does not own the order")]
    NotOwner { actor: UserId },
    /// The owner has no usable token to verify with.
    #[error("owner has no active provider account")]
    NoActiveCredential,
    /// The direct lookup found the order.
    #[error("order still exists at the provider")]
    StillPresentRemotely,
    /// A lookup failed, so absence could not be established.
    #[error("verification was inconclusive")]
    VerificationInconclusive,
}

/// Inputs to the eligibility rules.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    /// Provider the sweep ran against.
    pub provider: &'a str,
    /// Identity the sweep acts as.
    pub actor: UserId,
    /// Current time.
    pub now: DateTime<Utc>,
    /// Minimum order age.
    pub grace: chrono::Duration,
}

/// Check every deletion precondition that needs no network access.
///
/// # Errors
///
/// Returns the first rule the order fails.
pub fn check_eligibility(order: &LocalOrder, ctx: &GuardContext<'_>) -> Result<(), GuardRejection> {
    if order.provider != ctx.provider {
        return Err(GuardRejection::ProviderMismatch {
            provider: order.provider.clone(),
        });
    }
    if order.funds_confirmed {
        return Err(GuardRejection::FundsConfirmed);
    }
    if !order.status.is_deletable() {
        return Err(GuardRejection::StatusNotDeletable {
            status: order.status,
        });
    }
    if ctx.now - order.created_at < ctx.grace {
        return Err(GuardRejection::WithinGracePeriod);
    }
    if !order.has_tracking_identifier() {
        return Err(GuardRejection::NoTrackingIdentifier);
    }
    // Holds for managers too
    if order.owner_id != ctx.actor {
        return Err(GuardRejection::NotOwner { actor: ctx.actor });
    }
    Ok(())
}

/// Keys a direct lookup is attempted with: the tracking key, and the remote
/// id when it differs.
fn lookup_keys(order: &LocalOrder) -> Vec<TrackingKey> {
    let mut keys: Vec<TrackingKey> = order.tracking_key.iter().cloned().collect();
    if let Some(as_key) = order
        .remote_order_id
        .as_ref()
        .and_then(|remote_id| TrackingKey::parse(remote_id.as_str()))
        && !keys.contains(&as_key)
    {
        keys.push(as_key);
    }
    keys
}

/// Network half of the guard.
pub struct DeletionGuard {
    provider: Arc<dyn DeliveryProvider>,
    settle: Duration,
    retries: u32,
}

impl DeletionGuard {
    /// Create a guard. `retries` is clamped to at least one.
    #[must_use]
    pub fn new(provider: Arc<dyn DeliveryProvider>, settle: Duration, retries: u32) -> Self {
        Self {
            provider,
            settle,
            retries: retries.max(1),
        }
    }

    /// Confirm that an order is gone under every active account of its owner.
    ///
    /// Runs `1 + retries` rounds, each after the settle delay. A round looks
    /// the order up with every lookup key under every active credential. A
    /// failed lookup is retried after the settle delay, up to `retries` times.
    ///
    /// # Errors
    ///
    /// Returns `StillPresentRemotely` on any hit, `VerificationInconclusive`
    /// if a lookup still failed after its retries, and `NoActiveCredential`
    /// if the owner has no usable token.
    #[instrument(
        skip(self, order, credentials),
        fields(order_id = %order.id, owner = %order.owner_id)
    )]
    pub async fn verify_gone(
        &self,
        order: &LocalOrder,
        credentials: &[ProviderCredential],
        now: DateTime<Utc>,
    ) -> Result<(), GuardRejection> {
        let active: Vec<&ProviderCredential> = credentials
            .iter()
            .filter(|credential| {
                credential.owner_id == order.owner_id && credential.is_active_at(now)
            })
            .collect();
        if active.is_empty() {
            return Err(GuardRejection::NoActiveCredential);
        }

        let keys = lookup_keys(order);
        if keys.is_empty() {
            return Err(GuardRejection::NoTrackingIdentifier);
        }

        for round in 0..=self.retries {
            tokio::time::sleep(self.settle).await;

            for credential in &active {
                for key in &keys {
                    if self.lookup(credential, key).await? {
                        debug!(
                            round,
                            account = %credential.account_username,
                            "Order found by direct lookup"
                        );
                        return Err(GuardRejection::StillPresentRemotely);
                    }
                }
            }
        }

        Ok(())
    }

    /// One direct lookup, retried on failure. Returns whether the order was found.
    async fn lookup(
        &self,
        credential: &ProviderCredential,
        key: &TrackingKey,
    ) -> Result<bool, GuardRejection> {
        let mut failures = 0;
        loop {
            match self
                .provider
                .get_order_by_tracking_key(&credential.token, key)
                .await
            {
                Ok(found) => return Ok(found.is_some()),
                Err(e) if failures < self.retries => {
                    failures += 1;
                    warn!(
                        failures,
                        account = %credential.account_username,
                        error = %e,
                        "Pre-deletion lookup failed, retrying"
                    );
                    tokio::time::sleep(self.settle).await;
                }
                Err(e) => {
                    warn!(
                        failures,
                        account = %credential.account_username,
                        error = %e,
                        "Pre-deletion lookup failed"
                    );
                    return Err(GuardRejection::VerificationInconclusive);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dispatch_sync_core::{OrderId, RemoteOrderId};

    use super::*;

    fn order(age: chrono::Duration) -> LocalOrder {
        LocalOrder {
            id: OrderId::new(1),
            owner_id: UserId::new(7),
            tracking_key: TrackingKey::parse("RY-1"),
            remote_order_id: None,
            status: OrderStatus::Pending,
            remote_status_text: None,
            funds_confirmed: false,
            delivery_fee: None,
            created_at: Utc::now() - age,
            provider: "default".to_string(),
        }
    }

    fn ctx(actor: i32) -> GuardContext<'static> {
        GuardContext {
            provider: "default",
            actor: UserId::new(actor),
            now: Utc::now(),
            grace: chrono::Duration::minutes(10),
        }
    }

    #[test]
    fn test_eligible_order_passes() {
        assert_eq!(check_eligibility(&order(chrono::Duration::hours(1)), &ctx(7)), Ok(()));
    }

    #[test]
    fn test_young_order_is_rejected() {
        assert_eq!(
            check_eligibility(&order(chrono::Duration::seconds(30)), &ctx(7)),
            Err(GuardRejection::WithinGracePeriod)
        );
    }

    #[test]
    fn test_funds_confirmed_is_rejected() {
        let mut settled = order(chrono::Duration::hours(1));
        settled.funds_confirmed = true;
        assert_eq!(
            check_eligibility(&settled, &ctx(7)),
            Err(GuardRejection::FundsConfirmed)
        );
    }

    #[test]
    fn test_terminal_statuses_are_rejected() {
        for status in [
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            let mut terminal = order(chrono::Duration::hours(1));
            terminal.status = status;
            assert_eq!(
                check_eligibility(&terminal, &ctx(7)),
                Err(GuardRejection::StatusNotDeletable { status })
            );
        }
    }

    #[test]
    fn test_other_actor_is_rejected() {
        assert_eq!(
            check_eligibility(&order(chrono::Duration::hours(1)), &ctx(8)),
            Err(GuardRejection::NotOwner {
                actor: UserId::new(8)
            })
        );
    }

    #[test]
    fn test_missing_identifiers_and_provider_mismatch() {
        let mut bare = order(chrono::Duration::hours(1));
        bare.tracking_key = None;
        assert_eq!(
            check_eligibility(&bare, &ctx(7)),
            Err(GuardRejection::NoTrackingIdentifier)
        );

        let mut elsewhere = order(chrono::Duration::hours(1));
        elsewhere.provider = "other".to_string();
        assert_eq!(
            check_eligibility(&elsewhere, &ctx(7)),
            Err(GuardRejection::ProviderMismatch {
                provider: "other".to_string()
            })
        );
    }

    #[test]
    fn test_lookup_keys_include_remote_id_once() {
        let mut with_id = order(chrono::Duration::hours(1));
        with_id.remote_order_id = RemoteOrderId::parse("991");
        assert_eq!(lookup_keys(&with_id).len(), 2);

        with_id.tracking_key = TrackingKey::parse("991");
        assert_eq!(lookup_keys(&with_id).len(), 1);
    }
}
