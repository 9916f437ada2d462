//! PostgreSQL implementations of the engine's storage traits.
//!
//! Whole-session transitions ride on conditional single-statement updates,
//! so two racing callers serialize on the row and exactly one observes the
//! transition. Multi-row steps (snapshot lock, rejection resets, aggregate
//! refreshes) run inside a transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use stocktake_counts::audit::{
    CountAuditAction, CountAuditEvent, CountAuditEventInput, CountAuditStore,
};
use stocktake_counts::count::{CountFilter, CycleCount, CycleCountItem, ListOptions};
use stocktake_counts::error::Result;
use stocktake_counts::ledger::{LedgerBalance, StockLedger};
use stocktake_counts::store::{CycleCountStore, ItemSnapshot};
use stocktake_counts::types::AdjustmentId;
use stocktake_counts::variance::{self, ThresholdStore, VarianceThresholds};

use crate::models::{
    CountAuditEventRow, CycleCountItemRow, CycleCountRow, StockAdjustmentRow, StockLevelRow,
    VarianceThresholdRow,
};

/// Cycle count store over a Postgres pool.
pub struct PgCycleCountStore {
    pool: PgPool,
}

impl PgCycleCountStore {
    /// Create a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_domain<'e, E>(executor: E, id: Uuid) -> Result<CycleCount>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row: CycleCountRow = sqlx::query_as(
            r"
            SELECT * FROM cycle_counts WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_one(executor)
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl CycleCountStore for PgCycleCountStore {
    async fn create(&self, count: CycleCount, items: Vec<CycleCountItem>) -> Result<CycleCount> {
        let mut tx = self.pool.begin().await?;
        let id = count.id.into_inner();
        CycleCountRow::insert(&mut *tx, &count).await?;
        CycleCountItemRow::bulk_insert(&mut *tx, &items).await?;
        CycleCountRow::refresh_aggregates(&mut *tx, id).await?;
        let created = Self::fetch_domain(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>> {
        Ok(CycleCountRow::find_by_id(&self.pool, tenant_id, id)
            .await?
            .map(Into::into))
    }

    async fn find_by_count_number(
        &self,
        tenant_id: Uuid,
        count_number: &str,
    ) -> Result<Option<CycleCount>> {
        Ok(
            CycleCountRow::find_by_count_number(&self.pool, tenant_id, count_number)
                .await?
                .map(Into::into),
        )
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &CountFilter,
        options: &ListOptions,
    ) -> Result<Vec<CycleCount>> {
        let rows = CycleCountRow::list_by_tenant(
            &self.pool,
            tenant_id,
            filter,
            options.limit,
            options.offset,
        )
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, tenant_id: Uuid, filter: &CountFilter) -> Result<i64> {
        Ok(CycleCountRow::count_by_tenant(&self.pool, tenant_id, filter).await?)
    }

    async fn list_items(&self, tenant_id: Uuid, count_id: Uuid) -> Result<Vec<CycleCountItem>> {
        let rows = CycleCountItemRow::list_for_count(&self.pool, tenant_id, count_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_item(
        &self,
        tenant_id: Uuid,
        count_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<CycleCountItem>> {
        Ok(CycleCountItemRow::find_by_stock_item(
            &self.pool,
            tenant_id,
            count_id,
            stock_item_id,
            batch_id,
        )
        .await?
        .map(Into::into))
    }

    async fn lock_snapshot(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        snapshots: Vec<ItemSnapshot>,
    ) -> Result<Option<CycleCount>> {
        let mut tx = self.pool.begin().await?;
        if CycleCountRow::start(&mut *tx, tenant_id, id).await?.is_none() {
            return Ok(None);
        }
        for snapshot in snapshots {
            CycleCountItemRow::lock_baseline(
                &mut *tx,
                tenant_id,
                snapshot.item_id,
                snapshot.quantity,
                snapshot.unit_cost,
            )
            .await?;
        }
        CycleCountRow::refresh_aggregates(&mut *tx, id).await?;
        let started = Self::fetch_domain(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(started))
    }

    async fn record_count(
        &self,
        tenant_id: Uuid,
        count_id: Uuid,
        item_id: Uuid,
        quantity: Decimal,
        counted_by: Uuid,
        notes: Option<String>,
    ) -> Result<Option<CycleCountItem>> {
        let mut tx = self.pool.begin().await?;

        // Serialize same-row racers across the figure computation and the
        // write; the conditional update re-checks the session status.
        let locked: Option<CycleCountItemRow> = sqlx::query_as(
            r"
            SELECT * FROM cycle_count_items
            WHERE id = $1 AND tenant_id = $2
            FOR UPDATE
            ",
        )
        .bind(item_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(locked) = locked else {
            return Ok(None);
        };
        let (Some(system_quantity), Some(unit_cost)) = (locked.system_quantity, locked.unit_cost)
        else {
            return Ok(None);
        };

        let figures = variance::compute(system_quantity, unit_cost, quantity);
        let updated = CycleCountItemRow::record_count(
            &mut *tx,
            tenant_id,
            count_id,
            item_id,
            quantity,
            &figures,
            counted_by,
            notes.as_deref(),
        )
        .await?;
        let Some(updated) = updated else {
            return Ok(None);
        };
        CycleCountRow::refresh_aggregates(&mut *tx, count_id).await?;
        tx.commit().await?;
        Ok(Some(updated.into()))
    }

    async fn submit(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>> {
        Ok(CycleCountRow::submit(&self.pool, tenant_id, id)
            .await?
            .map(Into::into))
    }

    async fn approve(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        approved_by: Uuid,
    ) -> Result<Option<CycleCount>> {
        let mut tx = self.pool.begin().await?;
        if CycleCountRow::approve(&mut *tx, tenant_id, id, approved_by)
            .await?
            .is_none()
        {
            return Ok(None);
        }
        CycleCountRow::refresh_aggregates(&mut *tx, id).await?;
        let approved = Self::fetch_domain(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(approved))
    }

    async fn reject(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: String,
        clear_counts: bool,
        recount_item_ids: Vec<Uuid>,
    ) -> Result<Option<CycleCount>> {
        let mut tx = self.pool.begin().await?;
        if CycleCountRow::return_to_counting(&mut *tx, tenant_id, id, &reason_note)
            .await?
            .is_none()
        {
            return Ok(None);
        }
        if clear_counts {
            CycleCountItemRow::clear_counts(&mut *tx, tenant_id, id).await?;
        } else {
            CycleCountItemRow::flag_for_recount(&mut *tx, tenant_id, &recount_item_ids).await?;
        }
        CycleCountRow::refresh_aggregates(&mut *tx, id).await?;
        let rejected = Self::fetch_domain(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(rejected))
    }

    async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: Option<String>,
    ) -> Result<Option<CycleCount>> {
        Ok(
            CycleCountRow::cancel(&self.pool, tenant_id, id, reason_note.as_deref())
                .await?
                .map(Into::into),
        )
    }

    async fn claim_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<bool> {
        Ok(CycleCountItemRow::claim_adjustment(&self.pool, tenant_id, item_id).await?)
    }

    async fn confirm_adjustment(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        adjustment_id: AdjustmentId,
    ) -> Result<()> {
        CycleCountItemRow::confirm_adjustment(
            &self.pool,
            tenant_id,
            item_id,
            adjustment_id.into_inner(),
        )
        .await?;
        Ok(())
    }

    async fn release_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<()> {
        CycleCountItemRow::release_adjustment(&self.pool, tenant_id, item_id).await?;
        Ok(())
    }
}

/// Stock ledger over a Postgres pool.
///
/// The adjustment entry and the balance move commit in one transaction,
/// so the ledger never shows an adjustment without its effect.
pub struct PgStockLedger {
    pool: PgPool,
}

impl PgStockLedger {
    /// Create a new ledger.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockLedger for PgStockLedger {
    async fn get_balance(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<LedgerBalance> {
        Ok(
            StockLevelRow::find(&self.pool, tenant_id, warehouse_id, stock_item_id, batch_id)
                .await?
                .map(Into::into)
                .unwrap_or(LedgerBalance {
                    quantity: Decimal::ZERO,
                    unit_cost: Decimal::ZERO,
                }),
        )
    }

    async fn post_adjustment(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
        from_quantity: Decimal,
        to_quantity: Decimal,
    ) -> Result<AdjustmentId> {
        let mut tx = self.pool.begin().await?;
        let adjustment = StockAdjustmentRow::insert(
            &mut *tx,
            tenant_id,
            warehouse_id,
            stock_item_id,
            batch_id,
            from_quantity,
            to_quantity,
        )
        .await?;
        StockLevelRow::set_quantity(
            &mut *tx,
            tenant_id,
            warehouse_id,
            stock_item_id,
            batch_id,
            to_quantity,
        )
        .await?;
        tx.commit().await?;
        Ok(AdjustmentId::from(adjustment.id))
    }
}

/// Variance threshold store over a Postgres pool.
pub struct PgThresholdStore {
    pool: PgPool,
}

impl PgThresholdStore {
    /// Create a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThresholdStore for PgThresholdStore {
    async fn get(&self, tenant_id: Uuid) -> Result<Option<VarianceThresholds>> {
        Ok(VarianceThresholdRow::find(&self.pool, tenant_id)
            .await?
            .map(Into::into))
    }

    async fn set(&self, thresholds: VarianceThresholds) -> Result<()> {
        VarianceThresholdRow::upsert(&self.pool, &thresholds).await?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid) -> Result<()> {
        VarianceThresholdRow::delete(&self.pool, tenant_id).await?;
        Ok(())
    }
}

/// Audit store over a Postgres pool.
pub struct PgCountAuditStore {
    pool: PgPool,
}

impl PgCountAuditStore {
    /// Create a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CountAuditStore for PgCountAuditStore {
    async fn log_event(&self, input: CountAuditEventInput) -> Result<CountAuditEvent> {
        let action = input.action.unwrap_or(CountAuditAction::Created);
        let row = CountAuditEventRow::insert(&self.pool, &input, action).await?;
        Ok(row.into())
    }

    async fn list_for_count(
        &self,
        tenant_id: Uuid,
        cycle_count_id: Uuid,
    ) -> Result<Vec<CountAuditEvent>> {
        let rows =
            CountAuditEventRow::list_for_count(&self.pool, tenant_id, cycle_count_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
