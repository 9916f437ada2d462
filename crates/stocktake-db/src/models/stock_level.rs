//! Stock level row model: the ledger's current balance per item/batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use stocktake_counts::ledger::LedgerBalance;

/// A warehouse stock balance as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StockLevelRow {
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub stock_item_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<StockLevelRow> for LedgerBalance {
    fn from(row: StockLevelRow) -> Self {
        Self {
            quantity: row.quantity,
            unit_cost: row.unit_cost,
        }
    }
}

impl StockLevelRow {
    /// Read the balance for an item/batch.
    pub async fn find(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM stock_levels
            WHERE tenant_id = $1 AND warehouse_id = $2
              AND stock_item_id = $3
              AND batch_id IS NOT DISTINCT FROM $4
            ",
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(stock_item_id)
        .bind(batch_id)
        .fetch_optional(pool)
        .await
    }

    /// Move the book quantity for an item/batch, inserting the row if the
    /// ledger has never seen the item.
    pub async fn set_quantity<'e, E>(
        executor: E,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
        quantity: Decimal,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r"
            INSERT INTO stock_levels (tenant_id, warehouse_id, stock_item_id, batch_id, quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, warehouse_id, stock_item_id, COALESCE(batch_id, '00000000-0000-0000-0000-000000000000'::uuid))
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            ",
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(stock_item_id)
        .bind(batch_id)
        .bind(quantity)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_balance_conversion() {
        let row = StockLevelRow {
            tenant_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            stock_item_id: Uuid::new_v4(),
            batch_id: None,
            quantity: Decimal::from(42),
            unit_cost: Decimal::new(125, 2),
            updated_at: Utc::now(),
        };
        let balance: LedgerBalance = row.into();
        assert_eq!(balance.quantity, Decimal::from(42));
        assert_eq!(balance.unit_cost, Decimal::new(125, 2));
    }
}
