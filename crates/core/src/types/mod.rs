//! Core types for Dispatch Sync.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod credential;
pub mod fee;
pub mod id;
pub mod status;
pub mod tracking;

pub use credential::AccountUsername;
pub use fee::DeliveryFee;
pub use id::*;
pub use status::*;
pub use tracking::{RemoteOrderId, TrackingKey};
