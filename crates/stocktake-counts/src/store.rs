//! Cycle count storage trait and in-memory implementation.
//!
//! Every whole-session transition is check-and-set: the store mutates only
//! when the session is still in the expected status and returns `None`
//! otherwise, so racing callers serialize and exactly one wins. Per-item
//! count writes recompute the item's variance fields and the session
//! aggregates inside the same atomic section — no observer sees a fresh
//! count paired with stale derived values.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::count::{CountFilter, CycleCount, CycleCountItem, ListOptions};
use crate::error::Result;
use crate::types::{AdjustmentId, CountStatus};
use crate::variance;

/// One item's frozen baseline, written at lock time.
#[derive(Debug, Clone, Copy)]
pub struct ItemSnapshot {
    /// The line item to lock.
    pub item_id: Uuid,
    /// Book quantity read from the ledger.
    pub quantity: Decimal,
    /// Valuation cost read with the quantity.
    pub unit_cost: Decimal,
}

/// Trait for cycle count storage backends.
#[async_trait]
pub trait CycleCountStore: Send + Sync {
    /// Persist a new session together with its pre-lock item rows.
    async fn create(&self, count: CycleCount, items: Vec<CycleCountItem>) -> Result<CycleCount>;

    /// Get a session by ID within a tenant.
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>>;

    /// Find a session by its human-readable count number.
    async fn find_by_count_number(
        &self,
        tenant_id: Uuid,
        count_number: &str,
    ) -> Result<Option<CycleCount>>;

    /// List sessions with filtering and pagination.
    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &CountFilter,
        options: &ListOptions,
    ) -> Result<Vec<CycleCount>>;

    /// Count sessions with filtering.
    async fn count(&self, tenant_id: Uuid, filter: &CountFilter) -> Result<i64>;

    /// List a session's items in creation order.
    async fn list_items(&self, tenant_id: Uuid, count_id: Uuid) -> Result<Vec<CycleCountItem>>;

    /// Find one item by its stock item/batch pair.
    async fn find_item(
        &self,
        tenant_id: Uuid,
        count_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<CycleCountItem>>;

    /// Lock the snapshot: write every item's baseline and move the session
    /// from a pre-start status to `InProgress`, setting `started_at`.
    ///
    /// Returns `None` if the session is not in a startable status.
    async fn lock_snapshot(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        snapshots: Vec<ItemSnapshot>,
    ) -> Result<Option<CycleCount>>;

    /// Record a counted quantity for one item, recomputing its variance
    /// fields and the session aggregates atomically.
    ///
    /// Returns `None` if the session is no longer `InProgress`.
    async fn record_count(
        &self,
        tenant_id: Uuid,
        count_id: Uuid,
        item_id: Uuid,
        quantity: Decimal,
        counted_by: Uuid,
        notes: Option<String>,
    ) -> Result<Option<CycleCountItem>>;

    /// Move a fully counted session to `PendingReview`.
    ///
    /// Returns `None` if the session is not `InProgress`.
    async fn submit(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>>;

    /// Approve: move `PendingReview` to `Completed`, stamping the approver
    /// and completion time and finalizing the aggregates.
    ///
    /// Returns `None` if the session is not `PendingReview`; at most one of
    /// two racing approvals observes `Some`.
    async fn approve(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        approved_by: Uuid,
    ) -> Result<Option<CycleCount>>;

    /// Reject: move `PendingReview` back to `InProgress`, appending the
    /// reason to the session notes. With `clear_counts` every item's count
    /// and derived fields reset to null; otherwise counts are preserved and
    /// the listed items are flagged for recounting.
    ///
    /// Returns `None` if the session is not `PendingReview`.
    async fn reject(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: String,
        clear_counts: bool,
        recount_item_ids: Vec<Uuid>,
    ) -> Result<Option<CycleCount>>;

    /// Cancel a non-terminal session.
    ///
    /// Returns `None` if the session is already terminal.
    async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: Option<String>,
    ) -> Result<Option<CycleCount>>;

    /// Claim an item's adjustment guard ahead of a ledger write.
    ///
    /// Returns `true` only for the single caller that flips the guard from
    /// unclaimed; items already adjusted or mid-claim return `false`.
    async fn claim_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<bool>;

    /// Stamp a successful adjustment onto a claimed item.
    async fn confirm_adjustment(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        adjustment_id: AdjustmentId,
    ) -> Result<()>;

    /// Release a claim after a failed ledger write so a retry can try again.
    async fn release_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<()>;
}

// ============================================================================
// In-Memory Store (for testing)
// ============================================================================

#[derive(Debug)]
struct SessionRecord {
    count: CycleCount,
    items: Vec<CycleCountItem>,
    claims: HashSet<Uuid>,
}

impl SessionRecord {
    fn rescore(&mut self) {
        let totals = variance::score_session(self.items.iter().map(CycleCountItem::variance_figures));
        self.count.apply_totals(&totals);
    }
}

/// In-memory cycle count store for testing.
///
/// A single write lock over the session map makes every mutating method an
/// atomic section, which is the same guarantee the Postgres backend gets
/// from conditional single-statement updates.
#[derive(Debug, Default)]
pub struct InMemoryCycleCountStore {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl InMemoryCycleCountStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all sessions (for testing).
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    /// Number of stored sessions (for testing).
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn matches_filter(count: &CycleCount, filter: &CountFilter) -> bool {
    filter.status.is_none_or(|s| count.status == s)
        && filter.warehouse_id.is_none_or(|w| count.warehouse_id == w)
        && filter.count_type.is_none_or(|t| count.count_type == t)
}

#[async_trait]
impl CycleCountStore for InMemoryCycleCountStore {
    async fn create(&self, count: CycleCount, items: Vec<CycleCountItem>) -> Result<CycleCount> {
        let mut sessions = self.sessions.write().await;
        let mut record = SessionRecord {
            count,
            items,
            claims: HashSet::new(),
        };
        record.rescore();
        let stored = record.count.clone();
        sessions.insert(stored.id.into_inner(), record);
        Ok(stored)
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&id)
            .filter(|r| r.count.tenant_id == tenant_id)
            .map(|r| r.count.clone()))
    }

    async fn find_by_count_number(
        &self,
        tenant_id: Uuid,
        count_number: &str,
    ) -> Result<Option<CycleCount>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|r| r.count.tenant_id == tenant_id && r.count.count_number == count_number)
            .map(|r| r.count.clone()))
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &CountFilter,
        options: &ListOptions,
    ) -> Result<Vec<CycleCount>> {
        let sessions = self.sessions.read().await;
        let mut counts: Vec<CycleCount> = sessions
            .values()
            .filter(|r| r.count.tenant_id == tenant_id && matches_filter(&r.count, filter))
            .map(|r| r.count.clone())
            .collect();
        counts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(counts
            .into_iter()
            .skip(options.offset.max(0) as usize)
            .take(options.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, tenant_id: Uuid, filter: &CountFilter) -> Result<i64> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|r| r.count.tenant_id == tenant_id && matches_filter(&r.count, filter))
            .count() as i64)
    }

    async fn list_items(&self, tenant_id: Uuid, count_id: Uuid) -> Result<Vec<CycleCountItem>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&count_id)
            .filter(|r| r.count.tenant_id == tenant_id)
            .map(|r| r.items.clone())
            .unwrap_or_default())
    }

    async fn find_item(
        &self,
        tenant_id: Uuid,
        count_id: Uuid,
        stock_item_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<CycleCountItem>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&count_id)
            .filter(|r| r.count.tenant_id == tenant_id)
            .and_then(|r| {
                r.items
                    .iter()
                    .find(|i| i.stock_item_id == stock_item_id && i.batch_id == batch_id)
                    .cloned()
            }))
    }

    async fn lock_snapshot(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        snapshots: Vec<ItemSnapshot>,
    ) -> Result<Option<CycleCount>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(&id).filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if !record.count.status.can_start() {
            return Ok(None);
        }

        let now = Utc::now();
        let by_item: HashMap<Uuid, ItemSnapshot> = snapshots
            .into_iter()
            .map(|s| (s.item_id, s))
            .collect();
        for item in &mut record.items {
            if let Some(snapshot) = by_item.get(&item.id.into_inner()) {
                item.system_quantity = Some(snapshot.quantity);
                item.unit_cost = Some(snapshot.unit_cost);
                item.updated_at = now;
            }
        }
        record.count.status = CountStatus::InProgress;
        record.count.started_at = Some(now);
        record.count.updated_at = now;
        record.rescore();
        Ok(Some(record.count.clone()))
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
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions
            .get_mut(&count_id)
            .filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if !record.count.status.accepts_counts() {
            return Ok(None);
        }

        let now = Utc::now();
        let Some(item) = record
            .items
            .iter_mut()
            .find(|i| i.id.into_inner() == item_id)
        else {
            return Ok(None);
        };
        if !item.apply_count(quantity, counted_by, now, notes) {
            return Ok(None);
        }
        let updated = item.clone();
        record.count.updated_at = now;
        record.rescore();
        Ok(Some(updated))
    }

    async fn submit(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CycleCount>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(&id).filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if record.count.status != CountStatus::InProgress {
            return Ok(None);
        }
        record.count.status = CountStatus::PendingReview;
        record.count.updated_at = Utc::now();
        Ok(Some(record.count.clone()))
    }

    async fn approve(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        approved_by: Uuid,
    ) -> Result<Option<CycleCount>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(&id).filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if record.count.status != CountStatus::PendingReview {
            return Ok(None);
        }
        let now = Utc::now();
        record.count.status = CountStatus::Completed;
        record.count.approved_by = Some(approved_by);
        record.count.completed_at = Some(now);
        record.count.updated_at = now;
        record.rescore();
        Ok(Some(record.count.clone()))
    }

    async fn reject(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: String,
        clear_counts: bool,
        recount_item_ids: Vec<Uuid>,
    ) -> Result<Option<CycleCount>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(&id).filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if record.count.status != CountStatus::PendingReview {
            return Ok(None);
        }

        let now = Utc::now();
        if clear_counts {
            for item in &mut record.items {
                item.clear_count(now);
            }
        } else {
            let flagged: HashSet<Uuid> = recount_item_ids.into_iter().collect();
            for item in &mut record.items {
                if flagged.contains(&item.id.into_inner()) {
                    item.recount_requested = true;
                    item.updated_at = now;
                }
            }
        }

        record.count.status = CountStatus::InProgress;
        record.count.notes = Some(match record.count.notes.take() {
            Some(existing) => format!("{existing}\n{reason_note}"),
            None => reason_note,
        });
        record.count.updated_at = now;
        record.rescore();
        Ok(Some(record.count.clone()))
    }

    async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason_note: Option<String>,
    ) -> Result<Option<CycleCount>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(&id).filter(|r| r.count.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if !record.count.status.can_cancel() {
            return Ok(None);
        }
        record.count.status = CountStatus::Cancelled;
        if let Some(note) = reason_note {
            record.count.notes = Some(match record.count.notes.take() {
                Some(existing) => format!("{existing}\n{note}"),
                None => note,
            });
        }
        record.count.updated_at = Utc::now();
        Ok(Some(record.count.clone()))
    }

    async fn claim_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        for record in sessions.values_mut() {
            if record.count.tenant_id != tenant_id {
                continue;
            }
            if let Some(item) = record.items.iter().find(|i| i.id.into_inner() == item_id) {
                if item.adjustment_made || record.claims.contains(&item_id) {
                    return Ok(false);
                }
                record.claims.insert(item_id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn confirm_adjustment(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        adjustment_id: AdjustmentId,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        for record in sessions.values_mut() {
            if record.count.tenant_id != tenant_id {
                continue;
            }
            if let Some(item) = record
                .items
                .iter_mut()
                .find(|i| i.id.into_inner() == item_id)
            {
                item.adjustment_made = true;
                item.adjustment_id = Some(adjustment_id);
                item.updated_at = Utc::now();
                record.claims.remove(&item_id);
                return Ok(());
            }
        }
        Ok(())
    }

    async fn release_adjustment(&self, tenant_id: Uuid, item_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        for record in sessions.values_mut() {
            if record.count.tenant_id != tenant_id {
                continue;
            }
            record.claims.remove(&item_id);
        }
        Ok(())
    }
}
