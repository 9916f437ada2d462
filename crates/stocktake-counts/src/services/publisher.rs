//! Adjustment publication: converts approved variances into ledger writes.
//!
//! Publication is exactly-once per item. Each item's idempotency guard is
//! claimed before the ledger write and confirmed with the adjustment id
//! after it, so a retry or a concurrent publisher skips items already
//! handled and a failed write releases its claim for the next attempt. A
//! failure on one item never drops the rest: failures are collected and
//! reported with explicit success/failure counts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{CountAuditAction, CountAuditEventInput, CountAuditStore};
use crate::count::CycleCount;
use crate::error::Result;
use crate::ledger::StockLedger;
use crate::store::CycleCountStore;

/// One item that failed ledger publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentFailure {
    /// The line item that failed.
    pub item_id: Uuid,
    /// The stock item it would have adjusted.
    pub stock_item_id: Uuid,
    /// The ledger's error message.
    pub error: String,
}

/// Result of one publisher invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicationOutcome {
    /// Adjustments created by this invocation.
    pub adjustments_created: i64,
    /// Items that failed the ledger write this invocation.
    pub adjustments_failed: i64,
    /// Per-item failure detail.
    pub failures: Vec<AdjustmentFailure>,
}

impl PublicationOutcome {
    /// Check if every eligible item was adjusted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.adjustments_failed == 0
    }
}

/// Publishes ledger adjustments for an approved cycle count.
pub struct AdjustmentPublisher {
    store: Arc<dyn CycleCountStore>,
    ledger: Arc<dyn StockLedger>,
    audit: Arc<dyn CountAuditStore>,
}

impl AdjustmentPublisher {
    /// Create a new publisher.
    pub fn new(
        store: Arc<dyn CycleCountStore>,
        ledger: Arc<dyn StockLedger>,
        audit: Arc<dyn CountAuditStore>,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
        }
    }

    /// Publish one adjustment per item with non-zero variance and no
    /// adjustment yet. Safe to re-invoke: items with the guard set are
    /// skipped, items whose write fails release their claim.
    pub async fn publish(&self, count: &CycleCount, actor_id: Uuid) -> Result<PublicationOutcome> {
        let tenant_id = count.tenant_id;
        let items = self
            .store
            .list_items(tenant_id, count.id.into_inner())
            .await?;

        let mut outcome = PublicationOutcome::default();

        for item in items {
            if !item.has_variance() || item.adjustment_made {
                continue;
            }
            let (Some(from_quantity), Some(to_quantity)) =
                (item.system_quantity, item.counted_quantity)
            else {
                continue;
            };

            let item_id = item.id.into_inner();
            if !self.store.claim_adjustment(tenant_id, item_id).await? {
                // Another publisher holds or finished this item.
                continue;
            }

            match self
                .ledger
                .post_adjustment(
                    tenant_id,
                    count.warehouse_id,
                    item.stock_item_id,
                    item.batch_id,
                    from_quantity,
                    to_quantity,
                )
                .await
            {
                Ok(adjustment_id) => {
                    self.store
                        .confirm_adjustment(tenant_id, item_id, adjustment_id)
                        .await?;
                    outcome.adjustments_created += 1;

                    if let Err(e) = self
                        .audit
                        .log_event(CountAuditEventInput {
                            tenant_id,
                            cycle_count_id: count.id.into_inner(),
                            item_id: Some(item_id),
                            action: Some(CountAuditAction::AdjustmentPosted),
                            actor_id,
                            detail: Some(serde_json::json!({
                                "adjustment_id": adjustment_id,
                                "stock_item_id": item.stock_item_id,
                                "from_quantity": from_quantity,
                                "to_quantity": to_quantity,
                            })),
                            ..Default::default()
                        })
                        .await
                    {
                        tracing::warn!(error = %e, %item_id, "failed to audit adjustment");
                    }
                }
                Err(e) => {
                    self.store.release_adjustment(tenant_id, item_id).await?;
                    tracing::error!(
                        cycle_count_id = %count.id,
                        %item_id,
                        stock_item_id = %item.stock_item_id,
                        error = %e,
                        "ledger rejected adjustment"
                    );
                    outcome.adjustments_failed += 1;
                    outcome.failures.push(AdjustmentFailure {
                        item_id,
                        stock_item_id: item.stock_item_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}
