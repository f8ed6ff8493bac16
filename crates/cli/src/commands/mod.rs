//! Command implementations.

pub mod accounts;
pub mod migrate;
pub mod sync;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use dispatch_sync_server::config::{ConfigError, OperatorConfig};
use dispatch_sync_server::db::{
    self, CredentialRepository, EventRepository, OrderRepository, SettingsRepository,
};
use dispatch_sync_server::provider::{DeliveryProvider, ProviderClient, ProviderError};
use dispatch_sync_server::services::{AccountError, AccountService};
use dispatch_sync_server::sync::EngineDeps;

/// Errors from operator commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Provider client could not be built.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Account operation failed.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Output could not be rendered.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Everything an operator command needs.
pub struct Context {
    pub config: OperatorConfig,
    pub deps: EngineDeps,
    pub accounts: AccountService,
}

impl Context {
    /// Connect to the database and build the provider client.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if configuration, database or provider setup fails.
    pub async fn from_env() -> Result<Self, CommandError> {
        let config = OperatorConfig::from_env()?;

        tracing::info!("Connecting to database...");
        let pool = db::create_pool(&config.database_url).await?;

        let provider: Arc<dyn DeliveryProvider> = Arc::new(ProviderClient::new(&config.provider)?);
        let credentials = Arc::new(CredentialRepository::new(pool.clone()));

        let deps = EngineDeps {
            orders: Arc::new(OrderRepository::new(pool.clone())),
            credentials: credentials.clone(),
            settings: Arc::new(SettingsRepository::new(pool.clone())),
            events: Arc::new(EventRepository::new(pool)),
            provider: Arc::clone(&provider),
            funds: None,
        };

        Ok(Self {
            config,
            deps,
            accounts: AccountService::new(credentials, provider),
        })
    }
}

/// Print a value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns `CommandError::Output` if the value cannot be serialized.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
