//! Cycle count session and line item domain types.
//!
//! A [`CycleCount`] is the session aggregate; its [`CycleCountItem`] rows are
//! fixed once the session enters `InProgress`. Snapshot fields are written
//! exactly once at lock time, count fields mutate only while the session is
//! `InProgress`, and every derived field is recomputed rather than
//! hand-edited.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AdjustmentId, CountStatus, CountType, CycleCountId, CycleCountItemId};
use crate::variance::{self, SessionTotals, VarianceFigures};

/// A cycle count session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCount {
    /// Unique identifier.
    pub id: CycleCountId,
    /// Tenant this session belongs to.
    pub tenant_id: Uuid,
    /// Warehouse being counted.
    pub warehouse_id: Uuid,
    /// Human-readable count number, unique per tenant.
    pub count_number: String,
    /// What kind of count this session performs.
    pub count_type: CountType,
    /// Current workflow status.
    pub status: CountStatus,
    /// When true, counters are not shown book quantities while counting.
    /// Presentation-only; variance is still computed on entry.
    pub blind_count: bool,
    /// Informational future start date.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the snapshot was locked.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session was approved.
    pub completed_at: Option<DateTime<Utc>>,
    /// User who created the session.
    pub created_by: Uuid,
    /// User who approved the session.
    pub approved_by: Option<Uuid>,
    /// Items in scope.
    pub total_items: i64,
    /// Items with a recorded count.
    pub items_counted: i64,
    /// Counted items with non-zero variance.
    pub items_with_variance: i64,
    /// Signed net variance cost across counted items.
    pub total_variance_cost: Decimal,
    /// Fraction of counted items with zero variance, as a percentage.
    pub accuracy_percent: Option<Decimal>,
    /// Free-text notes; rejection reasons are appended here.
    pub notes: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CycleCount {
    /// Overwrite the derived aggregates from freshly scored totals.
    pub fn apply_totals(&mut self, totals: &SessionTotals) {
        self.total_items = totals.total_items;
        self.items_counted = totals.items_counted;
        self.items_with_variance = totals.items_with_variance;
        self.total_variance_cost = totals.total_variance_cost;
        self.accuracy_percent = totals.accuracy_percent();
    }

    /// Items still lacking a recorded count.
    #[must_use]
    pub fn items_remaining(&self) -> i64 {
        self.total_items - self.items_counted
    }
}

/// One stock item × batch in scope for a cycle count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCountItem {
    /// Unique identifier.
    pub id: CycleCountItemId,
    /// Tenant this item belongs to.
    pub tenant_id: Uuid,
    /// The parent session.
    pub cycle_count_id: CycleCountId,
    /// The stock item being counted.
    pub stock_item_id: Uuid,
    /// The batch being counted, if batch-tracked.
    pub batch_id: Option<Uuid>,
    /// Book quantity frozen at lock time. Never changes afterwards.
    pub system_quantity: Option<Decimal>,
    /// Valuation cost frozen with the quantity, so later purchases cannot
    /// retroactively reprice the variance.
    pub unit_cost: Option<Decimal>,
    /// Most recent counted quantity; correctable while the session is
    /// `InProgress`.
    pub counted_quantity: Option<Decimal>,
    /// Counted minus booked. Null exactly when `counted_quantity` is null.
    pub variance: Option<Decimal>,
    /// Variance relative to the booked quantity, as a percentage.
    pub variance_percent: Option<Decimal>,
    /// Variance valued at the frozen unit cost.
    pub variance_cost: Option<Decimal>,
    /// Who recorded the most recent count.
    pub counted_by: Option<Uuid>,
    /// When the most recent count was recorded.
    pub counted_at: Option<DateTime<Utc>>,
    /// Set by a preserve-counts rejection on items flagged over threshold.
    pub recount_requested: bool,
    /// Idempotency guard: true once a ledger adjustment exists for this item.
    pub adjustment_made: bool,
    /// The posted adjustment, set together with `adjustment_made`.
    pub adjustment_id: Option<AdjustmentId>,
    /// Free-text notes from the counter.
    pub notes: Option<String>,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// When the item was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CycleCountItem {
    /// Derived variance figures, present exactly when a count is recorded.
    #[must_use]
    pub fn variance_figures(&self) -> Option<VarianceFigures> {
        match (self.variance, self.variance_percent, self.variance_cost) {
            (Some(variance), Some(variance_percent), Some(variance_cost)) => {
                Some(VarianceFigures {
                    variance,
                    variance_percent,
                    variance_cost,
                })
            }
            _ => None,
        }
    }

    /// Check if a count has been recorded for this item.
    #[must_use]
    pub fn is_counted(&self) -> bool {
        self.counted_quantity.is_some()
    }

    /// Check if this item carries a non-zero variance.
    #[must_use]
    pub fn has_variance(&self) -> bool {
        self.variance.is_some_and(|v| v != Decimal::ZERO)
    }

    /// Record a count against the frozen snapshot, recomputing the derived
    /// variance fields in the same step.
    ///
    /// Returns `false` without mutating if the snapshot has not been locked.
    pub fn apply_count(
        &mut self,
        quantity: Decimal,
        counted_by: Uuid,
        counted_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> bool {
        let (Some(system_quantity), Some(unit_cost)) = (self.system_quantity, self.unit_cost)
        else {
            return false;
        };

        let figures = variance::compute(system_quantity, unit_cost, quantity);
        self.counted_quantity = Some(quantity);
        self.variance = Some(figures.variance);
        self.variance_percent = Some(figures.variance_percent);
        self.variance_cost = Some(figures.variance_cost);
        self.counted_by = Some(counted_by);
        self.counted_at = Some(counted_at);
        if notes.is_some() {
            self.notes = notes;
        }
        self.updated_at = counted_at;
        true
    }

    /// Reset the count and every derived field, as a clear-counts rejection
    /// does. The snapshot fields are untouched.
    pub fn clear_count(&mut self, at: DateTime<Utc>) {
        self.counted_quantity = None;
        self.variance = None;
        self.variance_percent = None;
        self.variance_cost = None;
        self.counted_by = None;
        self.counted_at = None;
        self.recount_requested = false;
        self.updated_at = at;
    }
}

// ============================================================================
// Inputs and Filters
// ============================================================================

/// Input for creating a cycle count session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCycleCountInput {
    /// Warehouse to count.
    pub warehouse_id: Uuid,
    /// What kind of count to perform.
    pub count_type: CountType,
    /// Selection configuration for the count type.
    pub scope: crate::catalog::CountScope,
    /// Optional explicit count number; generated when absent.
    pub count_number: Option<String>,
    /// Hide book quantities from counters.
    #[serde(default)]
    pub blind_count: bool,
    /// Informational future start date; lands the session in `Scheduled`.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// Input for recording one counted quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCountInput {
    /// The stock item counted.
    pub stock_item_id: Uuid,
    /// The batch counted, if batch-tracked.
    pub batch_id: Option<Uuid>,
    /// The physically counted quantity.
    pub quantity: Decimal,
    /// Free-text notes from the counter.
    pub notes: Option<String>,
}

/// Filter options for listing cycle counts.
#[derive(Debug, Clone, Default)]
pub struct CountFilter {
    /// Filter by status.
    pub status: Option<CountStatus>,
    /// Filter by warehouse.
    pub warehouse_id: Option<Uuid>,
    /// Filter by count type.
    pub count_type: Option<CountType>,
}

/// Options for list operations.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum number of results.
    pub limit: i64,
    /// Number of results to skip.
    pub offset: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Progress and variance summary for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountProgress {
    /// Session status at summary time.
    pub status: CountStatus,
    /// Aggregated totals across items.
    pub totals: SessionTotals,
    /// Accuracy percentage, when defined.
    pub accuracy_percent: Option<Decimal>,
    /// Items still lacking a count.
    pub items_remaining: i64,
    /// Items whose variance exceeds the tenant thresholds.
    pub items_over_threshold: i64,
}
