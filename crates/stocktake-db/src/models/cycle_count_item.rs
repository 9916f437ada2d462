//! Cycle count line item row model.
//!
//! Carries the frozen snapshot, the recorded count with its derived
//! variance fields, and the adjustment idempotency guard. The guard is a
//! claim/confirm/release protocol of single-statement conditional updates:
//! exactly one caller can move an item from unclaimed to claimed, and only
//! a failed ledger write releases it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use stocktake_counts::count::CycleCountItem;
use stocktake_counts::types::{AdjustmentId, CycleCountId, CycleCountItemId};
use stocktake_counts::variance::VarianceFigures;

/// A cycle count item as stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CycleCountItemRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cycle_count_id: Uuid,
    pub stock_item_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub system_quantity: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub counted_quantity: Option<Decimal>,
    pub variance: Option<Decimal>,
    pub variance_percent: Option<Decimal>,
    pub variance_cost: Option<Decimal>,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
    pub recount_requested: bool,
    pub adjustment_made: bool,
    pub adjustment_pending: bool,
    pub adjustment_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CycleCountItemRow> for CycleCountItem {
    fn from(row: CycleCountItemRow) -> Self {
        Self {
            id: CycleCountItemId::from(row.id),
            tenant_id: row.tenant_id,
            cycle_count_id: CycleCountId::from(row.cycle_count_id),
            stock_item_id: row.stock_item_id,
            batch_id: row.batch_id,
            system_quantity: row.system_quantity,
            unit_cost: row.unit_cost,
            counted_quantity: row.counted_quantity,
            variance: row.variance,
            variance_percent: row.variance_percent,
            variance_cost: row.variance_cost,
            counted_by: row.counted_by,
            counted_at: row.counted_at,
            recount_requested: row.recount_requested,
            adjustment_made: row.adjustment_made,
            adjustment_id: row.adjustment_id.map(AdjustmentId::from),
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl CycleCountItemRow {
    /// List a session's items in creation order.
    pub async fn list_for_count(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM cycle_count_items
            WHERE tenant_id = $1 AND cycle_count_id = $2
            ORDER BY created_at, id
            ",
        )
        .bind(tenant_id)
        .bind(cycle_count_id)
        .fetch_all(pool)
        .await
    }

    /// Find one item by its stock item/batch pair.
    pub async fn find_by_stock_item(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM cycle_count_items
            WHERE tenant_id = $1 AND cycle_count_id = $2
              AND stock_item_id = $3
              AND batch_id IS NOT DISTINCT FROM $4
            ",
        )
        .bind(tenant_id)
        .bind(cycle_count_id)
        .bind(stock_item_id)
        .bind(batch_id)
        .fetch_optional(pool)
        .await
    }

    /// Bulk insert the pre-lock item rows for a new session.
    pub async fn bulk_insert<'e, E>(
        executor: E,
        items: &[CycleCountItem],
    ) -> Result<u64, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        if items.is_empty() {
            return Ok(0);
        }

        let mut query = String::from(
            r"
            INSERT INTO cycle_count_items (
                id, tenant_id, cycle_count_id, stock_item_id, batch_id
            ) VALUES
            ",
        );

        let mut params: Vec<String> = Vec::with_capacity(items.len());
        let mut param_idx = 1;
        for _ in items {
            params.push(format!(
                "(${}, ${}, ${}, ${}, ${})",
                param_idx,
                param_idx + 1,
                param_idx + 2,
                param_idx + 3,
                param_idx + 4
            ));
            param_idx += 5;
        }
        query.push_str(&params.join(", "));
        query.push_str(" ON CONFLICT DO NOTHING");

        let mut q = sqlx::query(&query);
        for item in items {
            q = q
                .bind(item.id.into_inner())
                .bind(item.tenant_id)
                .bind(item.cycle_count_id.into_inner())
                .bind(item.stock_item_id)
                .bind(item.batch_id);
        }

        let result = q.execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Write one item's frozen baseline. Write-once: an already locked row
    /// is left untouched.
    pub async fn lock_baseline<'e, E>(
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
    ) -> Result<bool, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE cycle_count_items
            SET system_quantity = $3,
                unit_cost = $4,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND system_quantity IS NULL
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .bind(quantity)
        .bind(unit_cost)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a count and its derived figures in one statement, guarded on
    /// the parent session still accepting counts.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_count<'e, E>(
        executor: E,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
        item_id: Uuid,
        quantity: Decimal,
        figures: &VarianceFigures,
        counted_by: Uuid,
        notes: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE cycle_count_items i
            SET counted_quantity = $4,
                variance = $5,
                variance_percent = $6,
                variance_cost = $7,
                counted_by = $8,
                counted_at = NOW(),
                notes = COALESCE($9, i.notes),
                updated_at = NOW()
            FROM cycle_counts c
            WHERE i.id = $1 AND i.tenant_id = $2
              AND c.id = $3 AND i.cycle_count_id = c.id
              AND c.status = 'in_progress'
            RETURNING i.*
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .bind(cycle_count_id)
        .bind(quantity)
        .bind(figures.variance)
        .bind(figures.variance_percent)
        .bind(figures.variance_cost)
        .bind(counted_by)
        .bind(notes)
        .fetch_optional(executor)
        .await
    }

    /// Null out every count-derived field for a session's items.
    pub async fn clear_counts<'e, E>(
        executor: E,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<u64, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE cycle_count_items
            SET counted_quantity = NULL,
                variance = NULL,
                variance_percent = NULL,
                variance_cost = NULL,
                counted_by = NULL,
                counted_at = NULL,
                recount_requested = FALSE,
                updated_at = NOW()
            WHERE tenant_id = $1 AND cycle_count_id = $2
            ",
        )
        .bind(tenant_id)
        .bind(cycle_count_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Flag the listed items for recounting.
    pub async fn flag_for_recount<'e, E>(
        executor: E,
        tenant_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<u64, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r"
            UPDATE cycle_count_items
            SET recount_requested = TRUE,
                updated_at = NOW()
            WHERE tenant_id = $1 AND id = ANY($2)
            ",
        )
        .bind(tenant_id)
        .bind(item_ids)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim the adjustment guard. Exactly one caller per item succeeds
    /// until the claim is released or confirmed.
    pub async fn claim_adjustment(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        item_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE cycle_count_items
            SET adjustment_pending = TRUE,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
              AND adjustment_made = FALSE
              AND adjustment_pending = FALSE
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp a posted adjustment onto a claimed item.
    pub async fn confirm_adjustment(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        item_id: Uuid,
        adjustment_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE cycle_count_items
            SET adjustment_made = TRUE,
                adjustment_id = $3,
                adjustment_pending = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .bind(adjustment_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Release a claim after a failed ledger write.
    pub async fn release_adjustment(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE cycle_count_items
            SET adjustment_pending = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND adjustment_made = FALSE
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_domain_conversion() {
        let now = Utc::now();
        let adjustment = Uuid::new_v4();
        let row = CycleCountItemRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            cycle_count_id: Uuid::new_v4(),
            stock_item_id: Uuid::new_v4(),
            batch_id: Some(Uuid::new_v4()),
            system_quantity: Some(Decimal::from(10)),
            unit_cost: Some(Decimal::from(2)),
            counted_quantity: Some(Decimal::from(8)),
            variance: Some(Decimal::from(-2)),
            variance_percent: Some(Decimal::from(-20)),
            variance_cost: Some(Decimal::from(-4)),
            counted_by: Some(Uuid::new_v4()),
            counted_at: Some(now),
            recount_requested: false,
            adjustment_made: true,
            adjustment_pending: false,
            adjustment_id: Some(adjustment),
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let domain: CycleCountItem = row.clone().into();
        assert_eq!(domain.id.into_inner(), row.id);
        assert_eq!(domain.adjustment_id.unwrap().into_inner(), adjustment);
        assert!(domain.has_variance());
        assert_eq!(domain.variance_figures().unwrap().variance_cost, Decimal::from(-4));
    }

    #[test]
    fn test_uncounted_row_has_no_figures() {
        let now = Utc::now();
        let row = CycleCountItemRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            cycle_count_id: Uuid::new_v4(),
            stock_item_id: Uuid::new_v4(),
            batch_id: None,
            system_quantity: Some(Decimal::from(10)),
            unit_cost: Some(Decimal::from(2)),
            counted_quantity: None,
            variance: None,
            variance_percent: None,
            variance_cost: None,
            counted_by: None,
            counted_at: None,
            recount_requested: false,
            adjustment_made: false,
            adjustment_pending: false,
            adjustment_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let domain: CycleCountItem = row.into();
        assert!(domain.variance_figures().is_none());
        assert!(!domain.is_counted());
    }
}
