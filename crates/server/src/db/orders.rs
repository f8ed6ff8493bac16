//! Order repository for database operations.
//!
//! Every write that gives stock back runs in one transaction with the order
//! write, so a crash can never leave a deleted order with its stock reserved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use tracing::instrument;

use dispatch_sync_core::{
    DeliveryFee, OrderId, OrderStatus, ProductId, RemoteOrderId, TrackingKey, UserId, VariantId,
};

use super::{OrderStore, RepositoryError};
use crate::models::{LocalOrder, OrderFilter, OrderLineItem, OrderUpdate, StockRelease};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    owner_id: UserId,
    provider: String,
    tracking_key: Option<String>,
    remote_order_id: Option<String>,
    status: OrderStatus,
    remote_status_text: Option<String>,
    funds_confirmed: bool,
    delivery_fee: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for LocalOrder {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let delivery_fee = row
            .delivery_fee
            .map(|amount| {
                DeliveryFee::new(amount).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "order {} has negative delivery fee {amount}",
                        row.id
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            tracking_key: row.tracking_key.as_deref().and_then(TrackingKey::parse),
            remote_order_id: row.remote_order_id.as_deref().and_then(RemoteOrderId::parse),
            status: row.status,
            remote_status_text: row.remote_status_text,
            funds_confirmed: row.funds_confirmed,
            delivery_fee,
            created_at: row.created_at,
            provider: row.provider,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    product_id: ProductId,
    variant_id: Option<VariantId>,
    quantity: i32,
}

impl From<LineItemRow> for OrderLineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
        }
    }
}

const ORDER_COLUMNS: &str = r"
    id, owner_id, provider, tracking_key, remote_order_id, status,
    remote_status_text, funds_confirmed, delivery_fee, created_at
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for local orders, their line items and reserved stock.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn line_items_in<'e, E>(
        executor: E,
        id: OrderId,
    ) -> Result<Vec<OrderLineItem>, RepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r"
            SELECT product_id, variant_id, quantity
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(OrderLineItem::from).collect())
    }

    /// Move reserved quantity of every line item back to available.
    async fn release_stock_in(
        tx: &mut Transaction<'_, Postgres>,
        id: OrderId,
    ) -> Result<Vec<StockRelease>, RepositoryError> {
        let items = Self::line_items_in(&mut **tx, id).await?;

        for item in &items {
            sqlx::query(
                r"
                UPDATE inventory_levels
                SET reserved = GREATEST(reserved - $3, 0),
                    available = available + $3,
                    updated_at = NOW()
                WHERE product_id = $1
                  AND COALESCE(variant_id, 0) = COALESCE($2, 0)
                ",
            )
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .execute(&mut **tx)
            .await?;
        }

        Ok(items.into_iter().map(StockRelease::from).collect())
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self), fields(provider = %filter.provider))]
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<LocalOrder>, RepositoryError> {
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|statuses| statuses.iter().map(|s| s.as_str().to_string()).collect());

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE provider = $1
              AND ($2::int4 IS NULL OR owner_id = $2)
              AND ($3::text[] IS NULL OR status::text = ANY($3))
            ORDER BY created_at, id
            "
        ))
        .bind(&filter.provider)
        .bind(filter.owner)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LocalOrder::try_from).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<LocalOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocalOrder::try_from).transpose()
    }

    async fn find_by_tracking_key(
        &self,
        provider: &str,
        key: &TrackingKey,
    ) -> Result<Option<LocalOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE provider = $1 AND TRIM(tracking_key) = $2
            ORDER BY id
            LIMIT 1
            "
        ))
        .bind(provider)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocalOrder::try_from).transpose()
    }

    async fn line_items(&self, id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError> {
        Self::line_items_in(&self.pool, id).await
    }

    #[instrument(skip(self, update), fields(order_id = %update.order_id))]
    async fn apply_update(
        &self,
        update: &OrderUpdate,
    ) -> Result<Vec<StockRelease>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_scalar::<_, OrderStatus>(
            "SELECT status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(update.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        // COALESCE keeps every column the update leaves unset
        sqlx::query(
            r"
            UPDATE orders
            SET status = COALESCE($2, status),
                remote_status_text = COALESCE($3, remote_status_text),
                delivery_fee = COALESCE($4, delivery_fee),
                funds_confirmed = COALESCE($5, funds_confirmed),
                remote_order_id = COALESCE(remote_order_id, $6),
                tracking_key = COALESCE($7, tracking_key),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(update.order_id)
        .bind(update.status)
        .bind(update.status_text.as_deref())
        .bind(update.delivery_fee.map(|fee| fee.amount()))
        .bind(update.funds_confirmed)
        .bind(update.remote_order_id.as_ref().map(RemoteOrderId::as_str))
        .bind(update.tracking_key.as_ref().map(|repair| repair.repaired.as_str()))
        .execute(&mut *tx)
        .await?;

        // Stock of a cancelled or returned order is already back in inventory
        let released = if update.release_stock && !stored.releases_stock() {
            Self::release_stock_in(&mut tx, update.order_id).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;
        Ok(released)
    }

    #[instrument(skip(self, verified), fields(order_id = %verified.id))]
    async fn delete_releasing_stock(
        &self,
        verified: &LocalOrder,
    ) -> Result<Vec<StockRelease>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so funds confirmation or a hand-off cannot race the delete
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(verified.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let current = LocalOrder::try_from(row)?;
        if !verified.still_deletable_as(&current) {
            return Err(RepositoryError::Changed);
        }

        let released = Self::release_stock_in(&mut tx, verified.id).await?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(verified.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(released)
    }

    async fn record_handoff(
        &self,
        id: OrderId,
        remote_id: &RemoteOrderId,
        tracking_key: &TrackingKey,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET remote_order_id = $2, tracking_key = $3, updated_at = NOW()
            WHERE id = $1 AND remote_order_id IS NULL
            ",
        )
        .bind(id)
        .bind(remote_id.as_str())
        .bind(tracking_key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
