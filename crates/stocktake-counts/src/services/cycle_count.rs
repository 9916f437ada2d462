//! Cycle count service.
//!
//! Owns the session lifecycle from creation through approval. Every
//! operation is tenant-scoped, gated by the capability oracle, validated
//! against the workflow table, and executed through the store's
//! check-and-set primitives so concurrent callers serialize.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{CountAuditAction, CountAuditEventInput, CountAuditStore};
use crate::capability::{CapabilityOracle, CountCapability};
use crate::catalog::{self, CatalogStore};
use crate::count::{
    CountFilter, CountProgress, CreateCycleCountInput, CycleCount, CycleCountItem, ListOptions,
    RecordCountInput,
};
use crate::error::{CountError, Result};
use crate::ledger::StockLedger;
use crate::services::publisher::{AdjustmentFailure, AdjustmentPublisher, PublicationOutcome};
use crate::store::{CycleCountStore, ItemSnapshot};
use crate::types::{CountStatus, CycleCountId, CycleCountItemId};
use crate::variance::{self, ThresholdStore, VarianceThresholds};
use crate::workflow::{self, CountAction};

/// Result of an approval: the completed session plus the publication
/// outcome. A non-empty failure set leaves the session `Completed` with
/// [`CycleCountService::retry_adjustments`] available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    /// The approved session.
    pub count: CycleCount,
    /// Adjustments created during this approval.
    pub adjustments_created: i64,
    /// Items whose ledger write failed.
    pub adjustments_failed: i64,
    /// Per-item failure detail.
    pub failures: Vec<AdjustmentFailure>,
}

/// Service for cycle count operations.
pub struct CycleCountService {
    store: Arc<dyn CycleCountStore>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn StockLedger>,
    thresholds: Arc<dyn ThresholdStore>,
    oracle: Arc<dyn CapabilityOracle>,
    audit: Arc<dyn CountAuditStore>,
    publisher: AdjustmentPublisher,
}

impl CycleCountService {
    /// Create a new cycle count service.
    pub fn new(
        store: Arc<dyn CycleCountStore>,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn StockLedger>,
        thresholds: Arc<dyn ThresholdStore>,
        oracle: Arc<dyn CapabilityOracle>,
        audit: Arc<dyn CountAuditStore>,
    ) -> Self {
        let publisher = AdjustmentPublisher::new(store.clone(), ledger.clone(), audit.clone());
        Self {
            store,
            catalog,
            ledger,
            thresholds,
            oracle,
            audit,
            publisher,
        }
    }

    /// Create a cycle count session with its item scope attached.
    ///
    /// The session lands in `Scheduled` when a future `scheduled_at` is
    /// given, otherwise `Draft`; the two are equivalent for transitions.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        input: CreateCycleCountInput,
        created_by: Uuid,
    ) -> Result<CycleCount> {
        self.authorize(tenant_id, created_by, CountCapability::Create)
            .await?;

        if let Some(scheduled_at) = input.scheduled_at {
            if scheduled_at <= Utc::now() {
                return Err(CountError::Validation(
                    "scheduled_at must be in the future".to_string(),
                ));
            }
        }

        let count_number = match input.count_number {
            Some(number) => {
                let trimmed = number.trim();
                if trimmed.is_empty() {
                    return Err(CountError::Validation(
                        "count number must not be blank".to_string(),
                    ));
                }
                trimmed.to_string()
            }
            None => generate_count_number(),
        };
        if self
            .store
            .find_by_count_number(tenant_id, &count_number)
            .await?
            .is_some()
        {
            return Err(CountError::CountNumberExists(count_number));
        }

        let scope = catalog::select_in_scope(
            self.catalog.as_ref(),
            tenant_id,
            input.warehouse_id,
            input.count_type,
            &input.scope,
        )
        .await?;
        if scope.is_empty() {
            tracing::warn!(
                %tenant_id,
                warehouse_id = %input.warehouse_id,
                count_type = %input.count_type,
                "cycle count created with empty scope; start will be refused"
            );
        }

        let now = Utc::now();
        let status = if input.scheduled_at.is_some() {
            CountStatus::Scheduled
        } else {
            CountStatus::Draft
        };
        let count = CycleCount {
            id: CycleCountId::new(),
            tenant_id,
            warehouse_id: input.warehouse_id,
            count_number,
            count_type: input.count_type,
            status,
            blind_count: input.blind_count,
            scheduled_at: input.scheduled_at,
            started_at: None,
            completed_at: None,
            created_by,
            approved_by: None,
            total_items: 0,
            items_counted: 0,
            items_with_variance: 0,
            total_variance_cost: Decimal::ZERO,
            accuracy_percent: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<CycleCountItem> = scope
            .into_iter()
            .map(|scoped| CycleCountItem {
                id: CycleCountItemId::new(),
                tenant_id,
                cycle_count_id: count.id,
                stock_item_id: scoped.stock_item_id,
                batch_id: scoped.batch_id,
                system_quantity: None,
                unit_cost: None,
                counted_quantity: None,
                variance: None,
                variance_percent: None,
                variance_cost: None,
                counted_by: None,
                counted_at: None,
                recount_requested: false,
                adjustment_made: false,
                adjustment_id: None,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let created = self.store.create(count, items).await?;
        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: created.id.into_inner(),
            action: Some(CountAuditAction::Created),
            actor_id: created_by,
            status_after: Some(created.status),
            ..Default::default()
        })
        .await;
        Ok(created)
    }

    /// Start a session: freeze every item's book quantity and valuation
    /// cost from the ledger and open the session for counting.
    pub async fn start(&self, tenant_id: Uuid, id: Uuid, actor_id: Uuid) -> Result<CycleCount> {
        self.authorize(tenant_id, actor_id, CountCapability::Create)
            .await?;
        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::Start)?;

        let items = self.store.list_items(tenant_id, id).await?;
        if items.is_empty() {
            return Err(CountError::NoItemsInScope);
        }

        let mut snapshots = Vec::with_capacity(items.len());
        for item in &items {
            let balance = self
                .ledger
                .get_balance(tenant_id, count.warehouse_id, item.stock_item_id, item.batch_id)
                .await?;
            snapshots.push(ItemSnapshot {
                item_id: item.id.into_inner(),
                quantity: balance.quantity,
                unit_cost: balance.unit_cost,
            });
        }

        let started = self
            .store
            .lock_snapshot(tenant_id, id, snapshots)
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::Start))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            action: Some(CountAuditAction::Started),
            actor_id,
            status_before: Some(count.status),
            status_after: Some(started.status),
            ..Default::default()
        })
        .await;
        Ok(started)
    }

    /// Record a counted quantity for one item in scope.
    ///
    /// The write and the variance recomputation are one atomic store
    /// mutation; a correction while still `InProgress` simply overwrites.
    pub async fn record_count(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: RecordCountInput,
        counter_id: Uuid,
    ) -> Result<CycleCountItem> {
        self.authorize(tenant_id, counter_id, CountCapability::Count)
            .await?;
        if input.quantity < Decimal::ZERO {
            return Err(CountError::InvalidQuantity(format!(
                "counted quantity must not be negative, got {}",
                input.quantity
            )));
        }

        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::RecordCount)?;

        let item = self
            .store
            .find_item(tenant_id, id, input.stock_item_id, input.batch_id)
            .await?
            .ok_or(CountError::ItemNotInScope {
                count_id: id,
                stock_item_id: input.stock_item_id,
            })?;

        let updated = self
            .store
            .record_count(
                tenant_id,
                id,
                item.id.into_inner(),
                input.quantity,
                counter_id,
                input.notes,
            )
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::RecordCount))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            item_id: Some(updated.id.into_inner()),
            action: Some(CountAuditAction::CountRecorded),
            actor_id: counter_id,
            detail: Some(serde_json::json!({
                "stock_item_id": updated.stock_item_id,
                "counted_quantity": updated.counted_quantity,
                "variance": updated.variance,
            })),
            ..Default::default()
        })
        .await;
        Ok(updated)
    }

    /// Submit a fully counted session for review.
    pub async fn submit_for_review(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        actor_id: Uuid,
    ) -> Result<CycleCount> {
        self.authorize(tenant_id, actor_id, CountCapability::Count)
            .await?;
        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::SubmitForReview)?;

        let remaining = count.items_remaining();
        if remaining > 0 {
            return Err(CountError::IncompleteCount { remaining });
        }

        let submitted = self
            .store
            .submit(tenant_id, id)
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::SubmitForReview))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            action: Some(CountAuditAction::Submitted),
            actor_id,
            status_before: Some(count.status),
            status_after: Some(submitted.status),
            ..Default::default()
        })
        .await;
        Ok(submitted)
    }

    /// Approve a session under review: complete it, finalize the
    /// aggregates, and publish one adjustment per non-zero variance.
    ///
    /// The status check-and-set guarantees exactly one of two racing
    /// approvals runs the publisher. Publication failures leave the session
    /// `Completed`; they are reported in the outcome and retriable via
    /// [`Self::retry_adjustments`].
    pub async fn approve(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        approver_id: Uuid,
    ) -> Result<ApprovalOutcome> {
        self.authorize(tenant_id, approver_id, CountCapability::Approve)
            .await?;
        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::Approve)?;

        let approved = self
            .store
            .approve(tenant_id, id, approver_id)
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::Approve))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            action: Some(CountAuditAction::Approved),
            actor_id: approver_id,
            status_before: Some(count.status),
            status_after: Some(approved.status),
            ..Default::default()
        })
        .await;

        let outcome = self.publisher.publish(&approved, approver_id).await?;
        if !outcome.is_complete() {
            tracing::warn!(
                cycle_count_id = %approved.id,
                failed = outcome.adjustments_failed,
                created = outcome.adjustments_created,
                "approval completed with unpublished adjustments"
            );
        }

        Ok(ApprovalOutcome {
            count: approved,
            adjustments_created: outcome.adjustments_created,
            adjustments_failed: outcome.adjustments_failed,
            failures: outcome.failures,
        })
    }

    /// Re-invoke the adjustment publisher on a completed session, picking
    /// up items whose ledger write previously failed.
    pub async fn retry_adjustments(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        actor_id: Uuid,
    ) -> Result<PublicationOutcome> {
        self.authorize(tenant_id, actor_id, CountCapability::Approve)
            .await?;
        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::PublishAdjustments)?;

        self.publisher.publish(&count, actor_id).await
    }

    /// Reject a session under review back to counting.
    ///
    /// `clear_counts` forces a full recount by nulling every item's count
    /// and derived fields; otherwise counts are preserved and items over
    /// the tenant thresholds are flagged for re-entry.
    pub async fn reject(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: &str,
        clear_counts: bool,
        actor_id: Uuid,
    ) -> Result<CycleCount> {
        self.authorize(tenant_id, actor_id, CountCapability::Approve)
            .await?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CountError::RejectionReasonRequired);
        }

        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::Reject)?;

        let recount_item_ids = if clear_counts {
            Vec::new()
        } else {
            let thresholds = self.get_thresholds(tenant_id).await?;
            self.store
                .list_items(tenant_id, id)
                .await?
                .iter()
                .filter(|item| {
                    item.variance_figures()
                        .is_some_and(|f| thresholds.exceeded_by(&f))
                })
                .map(|item| item.id.into_inner())
                .collect()
        };

        let rejected = self
            .store
            .reject(
                tenant_id,
                id,
                format!("Rejected: {reason}"),
                clear_counts,
                recount_item_ids,
            )
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::Reject))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            action: Some(CountAuditAction::Rejected),
            actor_id,
            status_before: Some(count.status),
            status_after: Some(rejected.status),
            detail: Some(serde_json::json!({
                "reason": reason,
                "clear_counts": clear_counts,
            })),
            ..Default::default()
        })
        .await;
        Ok(rejected)
    }

    /// Cancel a non-terminal session. No further mutation is permitted
    /// afterwards.
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: Option<&str>,
        actor_id: Uuid,
    ) -> Result<CycleCount> {
        self.authorize(tenant_id, actor_id, CountCapability::Cancel)
            .await?;
        let count = self.get_status(tenant_id, id).await?;
        workflow::transition(count.status, CountAction::Cancel)?;

        let note = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| format!("Cancelled: {r}"));
        let cancelled = self
            .store
            .cancel(tenant_id, id, note)
            .await?
            .ok_or_else(|| self.lost_transition(&count, CountAction::Cancel))?;

        self.log_audit(CountAuditEventInput {
            tenant_id,
            cycle_count_id: id,
            action: Some(CountAuditAction::Cancelled),
            actor_id,
            status_before: Some(count.status),
            status_after: Some(cancelled.status),
            detail: reason.map(|r| serde_json::json!({ "reason": r })),
            ..Default::default()
        })
        .await;
        Ok(cancelled)
    }

    /// Get a session by ID.
    pub async fn get_status(&self, tenant_id: Uuid, id: Uuid) -> Result<CycleCount> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or(CountError::CountNotFound(id))
    }

    /// List a session's items in creation order.
    pub async fn list_items(&self, tenant_id: Uuid, id: Uuid) -> Result<Vec<CycleCountItem>> {
        let _ = self.get_status(tenant_id, id).await?;
        self.store.list_items(tenant_id, id).await
    }

    /// List sessions for a tenant.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &CountFilter,
        options: &ListOptions,
    ) -> Result<(Vec<CycleCount>, i64)> {
        let counts = self.store.list(tenant_id, filter, options).await?;
        let total = self.store.count(tenant_id, filter).await?;
        Ok((counts, total))
    }

    /// Progress and variance summary for a session.
    pub async fn get_progress(&self, tenant_id: Uuid, id: Uuid) -> Result<CountProgress> {
        let count = self.get_status(tenant_id, id).await?;
        let items = self.store.list_items(tenant_id, id).await?;
        let thresholds = self.get_thresholds(tenant_id).await?;

        let totals = variance::score_session(items.iter().map(CycleCountItem::variance_figures));
        let items_over_threshold = items
            .iter()
            .filter(|item| {
                item.variance_figures()
                    .is_some_and(|f| thresholds.exceeded_by(&f))
            })
            .count() as i64;

        Ok(CountProgress {
            status: count.status,
            accuracy_percent: totals.accuracy_percent(),
            items_remaining: totals.total_items - totals.items_counted,
            items_over_threshold,
            totals,
        })
    }

    /// Variance thresholds for a tenant, falling back to engine defaults.
    pub async fn get_thresholds(&self, tenant_id: Uuid) -> Result<VarianceThresholds> {
        Ok(self
            .thresholds
            .get(tenant_id)
            .await?
            .unwrap_or_else(|| VarianceThresholds::defaults(tenant_id)))
    }

    /// Replace a tenant's variance thresholds.
    pub async fn update_thresholds(
        &self,
        tenant_id: Uuid,
        percent_threshold: Decimal,
        cost_threshold: Decimal,
        actor_id: Uuid,
    ) -> Result<VarianceThresholds> {
        self.authorize(tenant_id, actor_id, CountCapability::Approve)
            .await?;
        let thresholds =
            VarianceThresholds::new(tenant_id, percent_threshold, cost_threshold, actor_id)?;
        self.thresholds.set(thresholds.clone()).await?;
        Ok(thresholds)
    }

    async fn authorize(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        capability: CountCapability,
    ) -> Result<()> {
        if self.oracle.allows(tenant_id, actor_id, capability).await? {
            Ok(())
        } else {
            Err(CountError::Unauthorized {
                actor_id,
                action: capability.to_string(),
            })
        }
    }

    /// Map a lost check-and-set to the invalid-transition error carrying
    /// the status the caller raced against.
    fn lost_transition(&self, count: &CycleCount, action: CountAction) -> CountError {
        CountError::InvalidTransition {
            status: count.status,
            action,
        }
    }

    async fn log_audit(&self, input: CountAuditEventInput) {
        if let Err(e) = self.audit.log_event(input).await {
            tracing::warn!(error = %e, "failed to record cycle count audit event");
        }
    }
}

/// Generate a human-readable count number.
fn generate_count_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "CC-{}-{}",
        Utc::now().format("%Y%m%d"),
        suffix[..6].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_count_number_shape() {
        let number = generate_count_number();
        assert!(number.starts_with("CC-"));
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_generated_numbers_are_distinct() {
        assert_ne!(generate_count_number(), generate_count_number());
    }
}
