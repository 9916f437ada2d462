//! Stock adjustment row model: the ledger entries posted at approval.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A posted ledger adjustment as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StockAdjustmentRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub stock_item_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub from_quantity: Decimal,
    pub to_quantity: Decimal,
    pub posted_at: DateTime<Utc>,
}

impl StockAdjustmentRow {
    /// Insert an adjustment entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert<'e, E>(
        executor: E,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
        from_quantity: Decimal,
        to_quantity: Decimal,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO stock_adjustments (
                tenant_id, warehouse_id, stock_item_id, batch_id,
                from_quantity, to_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(stock_item_id)
        .bind(batch_id)
        .bind(from_quantity)
        .bind(to_quantity)
        .fetch_one(executor)
        .await
    }

    /// List adjustments for one stock item, newest first.
    pub async fn list_for_item(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM stock_adjustments
            WHERE tenant_id = $1 AND warehouse_id = $2 AND stock_item_id = $3
            ORDER BY posted_at DESC
            ",
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(stock_item_id)
        .fetch_all(pool)
        .await
    }
}
