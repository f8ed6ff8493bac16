//! Dispatch Sync Core - Shared types library.
//!
//! This crate provides common types used across all Dispatch Sync components:
//! - `server` - Reconciliation engine and internal sync API
//! - `cli` - Command-line tools for migrations and operator commands
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, statuses, usernames, tracking keys and fees

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
