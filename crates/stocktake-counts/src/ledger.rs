//! Stock ledger boundary.
//!
//! The ledger is an external transactional resource. The engine's whole
//! contract with it is a read-consistent balance at snapshot time and a
//! single adjustment write per item at approval time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CountError, Result};
use crate::types::AdjustmentId;

/// A point-in-time balance for one item/batch in a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    /// Book quantity on hand.
    pub quantity: Decimal,
    /// Current valuation cost per unit.
    pub unit_cost: Decimal,
}

/// A ledger adjustment posted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedAdjustment {
    /// Identifier assigned by the ledger.
    pub id: AdjustmentId,
    /// Tenant the adjustment belongs to.
    pub tenant_id: Uuid,
    /// Warehouse adjusted.
    pub warehouse_id: Uuid,
    /// Stock item adjusted.
    pub stock_item_id: Uuid,
    /// Batch adjusted, if batch-tracked.
    pub batch_id: Option<Uuid>,
    /// Book quantity before the adjustment.
    pub from_quantity: Decimal,
    /// Book quantity after the adjustment.
    pub to_quantity: Decimal,
    /// When the adjustment was posted.
    pub posted_at: DateTime<Utc>,
}

/// Trait for the stock ledger the engine reads at lock time and writes at
/// approval time.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Read the current balance and valuation cost for an item/batch.
    async fn get_balance(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<LedgerBalance>;

    /// Post one adjustment moving the book quantity from `from_quantity`
    /// to `to_quantity`.
    async fn post_adjustment(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
        from_quantity: Decimal,
        to_quantity: Decimal,
    ) -> Result<AdjustmentId>;
}

type BalanceKey = (Uuid, Uuid, Uuid, Option<Uuid>);

/// In-memory implementation of [`StockLedger`] for testing.
///
/// Unknown items read as a zero balance, matching a ledger that has never
/// seen a movement for them.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    balances: RwLock<HashMap<BalanceKey, LedgerBalance>>,
    adjustments: RwLock<Vec<PostedAdjustment>>,
    failing_items: RwLock<HashSet<Uuid>>,
}

impl InMemoryStockLedger {
    /// Create a new in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance for an item/batch.
    pub async fn set_balance(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
        quantity: Decimal,
        unit_cost: Decimal,
    ) {
        let mut balances = self.balances.write().await;
        balances.insert(
            (tenant_id, warehouse_id, stock_item_id, batch_id),
            LedgerBalance {
                quantity,
                unit_cost,
            },
        );
    }

    /// All adjustments posted so far (for assertions).
    pub async fn adjustments(&self) -> Vec<PostedAdjustment> {
        self.adjustments.read().await.clone()
    }

    /// Make every future post for a stock item fail (for failure-path tests).
    pub async fn fail_item(&self, stock_item_id: Uuid) {
        self.failing_items.write().await.insert(stock_item_id);
    }

    /// Stop failing posts for a stock item.
    pub async fn heal_item(&self, stock_item_id: Uuid) {
        self.failing_items.write().await.remove(&stock_item_id);
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get_balance(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<LedgerBalance> {
        let balances = self.balances.read().await;
        Ok(balances
            .get(&(tenant_id, warehouse_id, stock_item_id, batch_id))
            .copied()
            .unwrap_or(LedgerBalance {
                quantity: Decimal::ZERO,
                unit_cost: Decimal::ZERO,
            }))
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
        if self.failing_items.read().await.contains(&stock_item_id) {
            return Err(CountError::Ledger(format!(
                "ledger rejected adjustment for stock item {stock_item_id}"
            )));
        }

        let id = AdjustmentId::new();
        let key = (tenant_id, warehouse_id, stock_item_id, batch_id);

        let mut balances = self.balances.write().await;
        let entry = balances.entry(key).or_insert(LedgerBalance {
            quantity: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
        });
        entry.quantity = to_quantity;

        self.adjustments.write().await.push(PostedAdjustment {
            id,
            tenant_id,
            warehouse_id,
            stock_item_id,
            batch_id,
            from_quantity,
            to_quantity,
            posted_at: Utc::now(),
        });

        Ok(id)
    }
}
