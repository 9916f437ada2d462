//! Variance computation, threshold classification, and accuracy scoring.
//!
//! All arithmetic is `Decimal` and deterministic: the same inputs always
//! produce the same figures, so recomputation after a corrected count is
//! idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{CountError, Result};

/// Derived variance figures for a counted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceFigures {
    /// Counted quantity minus snapshot quantity.
    pub variance: Decimal,
    /// Variance relative to the snapshot quantity, as a percentage.
    pub variance_percent: Decimal,
    /// Variance valued at the snapshot unit cost.
    pub variance_cost: Decimal,
}

/// Compute variance figures for a counted item.
///
/// A zero snapshot quantity cannot be used as a denominator; the percent
/// collapses to 100 when anything was found and 0 when the count confirms
/// the empty baseline.
#[must_use]
pub fn compute(
    system_quantity: Decimal,
    unit_cost: Decimal,
    counted_quantity: Decimal,
) -> VarianceFigures {
    let variance = counted_quantity - system_quantity;
    let variance_percent = if system_quantity != Decimal::ZERO {
        (variance / system_quantity) * Decimal::ONE_HUNDRED
    } else if counted_quantity > Decimal::ZERO {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };
    let variance_cost = variance * unit_cost;

    VarianceFigures {
        variance,
        variance_percent,
        variance_cost,
    }
}

// ============================================================================
// Threshold Classification
// ============================================================================

/// Per-tenant variance thresholds used to flag items for review emphasis.
///
/// Classification is advisory: it drives filtering and highlighting but
/// never blocks a workflow transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceThresholds {
    /// Tenant these thresholds apply to.
    pub tenant_id: Uuid,
    /// Absolute variance percent above which an item is flagged.
    pub percent_threshold: Decimal,
    /// Absolute variance cost above which an item is flagged.
    pub cost_threshold: Decimal,
    /// User who last changed the thresholds.
    pub updated_by: Uuid,
    /// When the thresholds were last changed.
    pub updated_at: DateTime<Utc>,
}

impl VarianceThresholds {
    /// Default thresholds: 5% or 1000 in cost, whichever trips first.
    pub const DEFAULT_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);
    pub const DEFAULT_COST: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

    /// Build the engine defaults for a tenant.
    #[must_use]
    pub fn defaults(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            percent_threshold: Self::DEFAULT_PERCENT,
            cost_threshold: Self::DEFAULT_COST,
            updated_by: Uuid::nil(),
            updated_at: Utc::now(),
        }
    }

    /// Build custom thresholds, validating both bounds are non-negative.
    pub fn new(
        tenant_id: Uuid,
        percent_threshold: Decimal,
        cost_threshold: Decimal,
        updated_by: Uuid,
    ) -> Result<Self> {
        if percent_threshold < Decimal::ZERO {
            return Err(CountError::InvalidThresholds(format!(
                "percent threshold must be non-negative, got {percent_threshold}"
            )));
        }
        if cost_threshold < Decimal::ZERO {
            return Err(CountError::InvalidThresholds(format!(
                "cost threshold must be non-negative, got {cost_threshold}"
            )));
        }
        Ok(Self {
            tenant_id,
            percent_threshold,
            cost_threshold,
            updated_by,
            updated_at: Utc::now(),
        })
    }

    /// Check whether variance figures exceed these thresholds.
    ///
    /// An item exceeds iff its variance is non-zero and either the percent
    /// or the cost bound is breached.
    #[must_use]
    pub fn exceeded_by(&self, figures: &VarianceFigures) -> bool {
        figures.variance != Decimal::ZERO
            && (figures.variance_percent.abs() > self.percent_threshold
                || figures.variance_cost.abs() > self.cost_threshold)
    }
}

/// Trait for storing per-tenant variance thresholds.
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    /// Get thresholds for a tenant.
    ///
    /// Returns `None` if no custom thresholds are configured.
    async fn get(&self, tenant_id: Uuid) -> Result<Option<VarianceThresholds>>;

    /// Set thresholds for a tenant.
    async fn set(&self, thresholds: VarianceThresholds) -> Result<()>;

    /// Delete thresholds for a tenant (revert to defaults).
    async fn delete(&self, tenant_id: Uuid) -> Result<()>;
}

/// In-memory implementation of [`ThresholdStore`] for testing.
#[derive(Debug, Default)]
pub struct InMemoryThresholdStore {
    thresholds: RwLock<HashMap<Uuid, VarianceThresholds>>,
}

impl InMemoryThresholdStore {
    /// Create a new in-memory threshold store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thresholds: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all thresholds (for testing).
    pub fn clear(&self) {
        self.thresholds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl ThresholdStore for InMemoryThresholdStore {
    async fn get(&self, tenant_id: Uuid) -> Result<Option<VarianceThresholds>> {
        Ok(self
            .thresholds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tenant_id)
            .cloned())
    }

    async fn set(&self, thresholds: VarianceThresholds) -> Result<()> {
        self.thresholds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(thresholds.tenant_id, thresholds);
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid) -> Result<()> {
        self.thresholds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&tenant_id);
        Ok(())
    }
}

// ============================================================================
// Accuracy Scoring
// ============================================================================

/// Session-level aggregates derived from per-item variance figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    /// Items in scope.
    pub total_items: i64,
    /// Items with a recorded count.
    pub items_counted: i64,
    /// Counted items whose variance is non-zero.
    pub items_with_variance: i64,
    /// Signed net variance cost across counted items.
    pub total_variance_cost: Decimal,
    /// Sum of positive variance costs (found more than booked).
    pub gain_cost: Decimal,
    /// Sum of negative variance costs (found less than booked).
    pub loss_cost: Decimal,
}

impl SessionTotals {
    /// Fraction of counted items with zero variance, as a percentage.
    ///
    /// Undefined until at least one item has been counted.
    #[must_use]
    pub fn accuracy_percent(&self) -> Option<Decimal> {
        if self.items_counted == 0 {
            return None;
        }
        let exact = Decimal::from(self.items_counted - self.items_with_variance);
        Some(exact / Decimal::from(self.items_counted) * Decimal::ONE_HUNDRED)
    }
}

/// Aggregate per-item variance figures into session totals.
///
/// One entry per item in scope; `None` marks an item not yet counted.
pub fn score_session<I>(figures: I) -> SessionTotals
where
    I: IntoIterator<Item = Option<VarianceFigures>>,
{
    let mut totals = SessionTotals::default();

    for entry in figures {
        totals.total_items += 1;
        let Some(f) = entry else { continue };
        totals.items_counted += 1;
        if f.variance != Decimal::ZERO {
            totals.items_with_variance += 1;
        }
        totals.total_variance_cost += f.variance_cost;
        if f.variance_cost > Decimal::ZERO {
            totals.gain_cost += f.variance_cost;
        } else {
            totals.loss_cost += f.variance_cost;
        }
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_compute_basic_shortage() {
        let f = compute(dec(10), dec(2), dec(8));
        assert_eq!(f.variance, dec(-2));
        assert_eq!(f.variance_percent, dec(-20));
        assert_eq!(f.variance_cost, dec(-4));
    }

    #[test]
    fn test_compute_exact_match() {
        let f = compute(dec(5), dec(3), dec(5));
        assert_eq!(f.variance, Decimal::ZERO);
        assert_eq!(f.variance_percent, Decimal::ZERO);
        assert_eq!(f.variance_cost, Decimal::ZERO);
    }

    #[test]
    fn test_compute_zero_baseline_with_finding() {
        let f = compute(Decimal::ZERO, dec(1), dec(2));
        assert_eq!(f.variance, dec(2));
        assert_eq!(f.variance_percent, dec(100));
        assert_eq!(f.variance_cost, dec(2));
    }

    #[test]
    fn test_compute_zero_baseline_confirmed_empty() {
        let f = compute(Decimal::ZERO, dec(7), Decimal::ZERO);
        assert_eq!(f.variance, Decimal::ZERO);
        assert_eq!(f.variance_percent, Decimal::ZERO);
        assert_eq!(f.variance_cost, Decimal::ZERO);
    }

    #[test]
    fn test_compute_fractional_quantities() {
        let f = compute(Decimal::new(25, 1), Decimal::new(40, 1), Decimal::new(20, 1));
        // 2.0 counted against 2.5 booked at 4.0 each
        assert_eq!(f.variance, Decimal::new(-5, 1));
        assert_eq!(f.variance_percent, dec(-20));
        assert_eq!(f.variance_cost, dec(-2));
    }

    #[test]
    fn test_compute_is_idempotent() {
        let a = compute(dec(10), dec(2), dec(12));
        let b = compute(dec(10), dec(2), dec(12));
        assert_eq!(a, b);
    }

    #[test]
    fn test_threshold_percent_clause_alone_triggers() {
        // Scenario: 8% variance with a cost of 50 against 5% / 1000 bounds.
        let thresholds =
            VarianceThresholds::new(Uuid::new_v4(), dec(5), dec(1000), Uuid::new_v4()).unwrap();
        let figures = VarianceFigures {
            variance: dec(4),
            variance_percent: dec(8),
            variance_cost: dec(50),
        };
        assert!(thresholds.exceeded_by(&figures));
    }

    #[test]
    fn test_threshold_cost_clause_alone_triggers() {
        let thresholds =
            VarianceThresholds::new(Uuid::new_v4(), dec(5), dec(1000), Uuid::new_v4()).unwrap();
        let figures = VarianceFigures {
            variance: dec(-3),
            variance_percent: dec(-2),
            variance_cost: dec(-1500),
        };
        assert!(thresholds.exceeded_by(&figures));
    }

    #[test]
    fn test_threshold_zero_variance_never_flags() {
        let thresholds = VarianceThresholds::defaults(Uuid::new_v4());
        let figures = VarianceFigures {
            variance: Decimal::ZERO,
            variance_percent: Decimal::ZERO,
            variance_cost: Decimal::ZERO,
        };
        assert!(!thresholds.exceeded_by(&figures));
    }

    #[test]
    fn test_threshold_within_bounds_not_flagged() {
        let thresholds = VarianceThresholds::defaults(Uuid::new_v4());
        let figures = VarianceFigures {
            variance: dec(1),
            variance_percent: dec(3),
            variance_cost: dec(200),
        };
        assert!(!thresholds.exceeded_by(&figures));
    }

    #[test]
    fn test_threshold_defaults() {
        let t = VarianceThresholds::defaults(Uuid::new_v4());
        assert_eq!(t.percent_threshold, dec(5));
        assert_eq!(t.cost_threshold, dec(1000));
    }

    #[test]
    fn test_threshold_validation_rejects_negative() {
        let tenant = Uuid::new_v4();
        let actor = Uuid::new_v4();
        assert!(VarianceThresholds::new(tenant, dec(-1), dec(10), actor).is_err());
        assert!(VarianceThresholds::new(tenant, dec(1), dec(-10), actor).is_err());
    }

    #[tokio::test]
    async fn test_threshold_store_set_get_delete() {
        let store = InMemoryThresholdStore::new();
        let tenant_id = Uuid::new_v4();

        assert!(store.get(tenant_id).await.unwrap().is_none());

        let thresholds =
            VarianceThresholds::new(tenant_id, dec(10), dec(500), Uuid::new_v4()).unwrap();
        store.set(thresholds.clone()).await.unwrap();

        let stored = store.get(tenant_id).await.unwrap().unwrap();
        assert_eq!(stored.percent_threshold, dec(10));
        assert_eq!(stored.cost_threshold, dec(500));

        store.delete(tenant_id).await.unwrap();
        assert!(store.get(tenant_id).await.unwrap().is_none());
    }

    #[test]
    fn test_score_session_mixed_items() {
        // systemQuantity = [10, 5, 0], counted = [10, 4, 2], unitCost = [2, 3, 1]
        let figures = vec![
            Some(compute(dec(10), dec(2), dec(10))),
            Some(compute(dec(5), dec(3), dec(4))),
            Some(compute(Decimal::ZERO, dec(1), dec(2))),
        ];
        let totals = score_session(figures);
        assert_eq!(totals.total_items, 3);
        assert_eq!(totals.items_counted, 3);
        assert_eq!(totals.items_with_variance, 2);
        assert_eq!(totals.total_variance_cost, dec(-1));
        assert_eq!(totals.gain_cost, dec(2));
        assert_eq!(totals.loss_cost, dec(-3));
    }

    #[test]
    fn test_score_session_uncounted_items_excluded() {
        let figures = vec![Some(compute(dec(10), dec(2), dec(9))), None, None];
        let totals = score_session(figures);
        assert_eq!(totals.total_items, 3);
        assert_eq!(totals.items_counted, 1);
        assert_eq!(totals.items_with_variance, 1);
    }

    #[test]
    fn test_accuracy_percent() {
        let totals = SessionTotals {
            total_items: 4,
            items_counted: 4,
            items_with_variance: 1,
            ..Default::default()
        };
        assert_eq!(totals.accuracy_percent().unwrap(), dec(75));
    }

    #[test]
    fn test_accuracy_undefined_with_no_counts() {
        let totals = SessionTotals {
            total_items: 3,
            ..Default::default()
        };
        assert!(totals.accuracy_percent().is_none());
    }
}
