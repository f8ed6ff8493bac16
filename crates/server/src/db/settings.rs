//! Per-user engine flags.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use dispatch_sync_core::UserId;

use super::{RepositoryError, SettingsStore};

/// Repository for `sync_settings`.
#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    /// Create a new settings repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SettingsRepository {
    #[instrument(skip(self))]
    async fn get_flag(&self, user: UserId, key: &str) -> Result<bool, RepositoryError> {
        let value: Option<bool> =
            sqlx::query_scalar("SELECT value FROM sync_settings WHERE user_id = $1 AND key = $2")
                .bind(user)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.unwrap_or(false))
    }

    #[instrument(skip(self))]
    async fn set_flag(&self, user: UserId, key: &str, value: bool) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO sync_settings (user_id, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            ",
        )
        .bind(user)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
