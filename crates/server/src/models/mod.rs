//! Domain models for the sync engine.
//!
//! These types are shared between the persistence layer, the provider client
//! and the reconciliation engine. Database row types stay private to `db`.

pub mod credential;
pub mod order;

pub use credential::{NewCredential, ProviderCredential};
pub use order::{
    LocalOrder, OrderFilter, OrderLineItem, OrderUpdate, StockRelease, TrackingKeyRepair,
};
