//! Append-only event log.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use super::{EventSink, RepositoryError};
use crate::sync::SyncEvent;

/// Repository writing engine events to `sync_events`.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new event repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for EventRepository {
    #[instrument(skip(self, event), fields(kind = event.kind()))]
    async fn append(&self, event: &SyncEvent) -> Result<(), RepositoryError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| RepositoryError::DataCorruption(format!("unserializable event: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO sync_events (kind, owner_id, order_id, payload)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(event.kind())
        .bind(event.user_id())
        .bind(event.order_id())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
