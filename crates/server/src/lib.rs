//! Dispatch Sync server library.
//!
//! Reconciles locally persisted orders with a third-party delivery
//! provider's merchant API, across every provider account a staff member
//! has connected.
//!
//! # Layers
//!
//! - [`provider`] - HTTP client for the provider's merchant API
//! - [`db`] - `PostgreSQL` repositories behind store traits
//! - [`services`] - Provider account management
//! - [`sync`] - The reconciliation engine and per-session registry
//! - [`routes`] - Internal JSON API consumed by the platform front-end
//!
//! The engine only depends on the store and provider traits, so it runs
//! unchanged against in-memory fakes in the integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
pub mod sync;
