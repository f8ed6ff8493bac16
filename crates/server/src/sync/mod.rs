//! The reconciliation engine.
//!
//! # Pipeline
//!
//! 1. [`sweep::Sweeper`] partitions local orders by owner and lists each
//!    owner's remote orders with that owner's own token
//! 2. [`index::RemoteOrderIndex`] indexes a listing by remote id and tracking key
//! 3. [`reconciler::reconcile`] decides update, deletion candidate or no-op,
//!    mapping remote statuses through [`taxonomy`] and the [`catalog::StatusCatalog`]
//! 4. [`guard`] gates every deletion behind eligibility rules and a direct
//!    lookup under all of the owner's accounts
//! 5. [`events`] carries what happened to the event log
//!
//! [`orchestrator::SyncEngine`] runs the pipeline for one session;
//! [`session::SessionRegistry`] keeps one engine per signed-in actor.

pub mod catalog;
pub mod events;
pub mod guard;
pub mod index;
pub mod notifier;
pub mod orchestrator;
pub mod reconciler;
pub mod session;
pub mod sweep;
pub mod taxonomy;

use thiserror::Error;

use dispatch_sync_core::OrderId;

use crate::db::RepositoryError;
use crate::provider::ProviderError;
use crate::services::AccountError;

pub use catalog::StatusCatalog;
pub use events::{EventBus, EventPublisher, Subscription, SyncEvent};
pub use guard::{DeletionGuard, GuardRejection};
pub use index::RemoteOrderIndex;
pub use orchestrator::{
    EngineDeps, FundsReconciliation, SingleOrderSync, SyncEngine, SyncPhase, SyncSnapshot,
    SyncTrigger,
};
pub use reconciler::{Reconciliation, reconcile};
pub use session::{Actor, SessionRegistry};
pub use sweep::{SweepMode, SweepReport};
pub use taxonomy::{StatusMapping, map_status};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A sync is already running for this session. Expected under
    /// periodic and manual overlap.
    #[error("a sync is already in progress")]
    ConcurrentSweepRejected,

    /// No local order with that key or id.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The session may not act on another owner's order.
    #[error("order {0} belongs to another user")]
    NotPermitted(OrderId),

    /// The order already has a remote id.
    #[error("order {0} was already handed off")]
    AlreadyHandedOff(OrderId),

    /// Credential resolution failed.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Database operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
