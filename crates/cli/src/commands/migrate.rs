//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! dsync migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SYNC_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/server/migrations/`.

use secrecy::ExposeSecret;
use sqlx::PgPool;
use thiserror::Error;

use dispatch_sync_server::config::{ConfigError, database_url_from_env};

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
