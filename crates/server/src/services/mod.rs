//! Business logic services.

pub mod accounts;

pub use accounts::{AccountError, AccountService};
