//! Type definitions for the cycle count domain.
//!
//! Includes newtype wrappers for IDs and enums for domain values.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types (Newtype Pattern)
// ============================================================================

/// Unique identifier for a cycle count session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleCountId(pub Uuid);

impl CycleCountId {
    /// Create a new random CycleCountId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CycleCountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleCountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CycleCountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<CycleCountId> for Uuid {
    fn from(id: CycleCountId) -> Self {
        id.0
    }
}

/// Unique identifier for a cycle count line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleCountItemId(pub Uuid);

impl CycleCountItemId {
    /// Create a new random CycleCountItemId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CycleCountItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleCountItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CycleCountItemId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<CycleCountItemId> for Uuid {
    fn from(id: CycleCountItemId) -> Self {
        id.0
    }
}

/// Unique identifier for a posted stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(pub Uuid);

impl AdjustmentId {
    /// Create a new random AdjustmentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AdjustmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AdjustmentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<AdjustmentId> for Uuid {
    fn from(id: AdjustmentId) -> Self {
        id.0
    }
}

// ============================================================================
// Domain Enums
// ============================================================================

/// What kind of count a session performs, which drives item selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cycle_count_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CountType {
    /// Count every active item in the warehouse.
    Full,
    /// Count items classified as velocity class A.
    AbcClassA,
    /// Count items classified as velocity class B.
    AbcClassB,
    /// Count items classified as velocity class C.
    AbcClassC,
    /// Count a uniformly sampled subset of active items.
    Random,
    /// Count an explicitly chosen set of items.
    Spot,
}

impl fmt::Display for CountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::AbcClassA => write!(f, "abc_class_a"),
            Self::AbcClassB => write!(f, "abc_class_b"),
            Self::AbcClassC => write!(f, "abc_class_c"),
            Self::Random => write!(f, "random"),
            Self::Spot => write!(f, "spot"),
        }
    }
}

/// Velocity classification used by ABC-scoped counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbcClass {
    /// High-velocity items, counted most often.
    A,
    /// Medium-velocity items.
    B,
    /// Low-velocity items.
    C,
}

/// Status for cycle count sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cycle_count_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    /// Session created but not yet started.
    Draft,
    /// Session created with a future start date; equivalent to draft for transitions.
    Scheduled,
    /// Snapshot locked, counters are recording quantities.
    InProgress,
    /// All items counted, awaiting approval or rejection.
    PendingReview,
    /// Approved; adjustments published, session read-only.
    Completed,
    /// Cancelled; session read-only.
    Cancelled,
}

impl CountStatus {
    /// Check if the session can be started (snapshot not yet locked).
    #[must_use]
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }

    /// Check if the session accepts count entries.
    #[must_use]
    pub fn accepts_counts(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if the session can be cancelled.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Check if the session is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for CountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::InProgress => write!(f, "in_progress"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_can_start() {
        assert!(CountStatus::Draft.can_start());
        assert!(CountStatus::Scheduled.can_start());
        assert!(!CountStatus::InProgress.can_start());
        assert!(!CountStatus::PendingReview.can_start());
        assert!(!CountStatus::Completed.can_start());
        assert!(!CountStatus::Cancelled.can_start());
    }

    #[test]
    fn test_status_accepts_counts() {
        assert!(CountStatus::InProgress.accepts_counts());
        assert!(!CountStatus::Draft.accepts_counts());
        assert!(!CountStatus::PendingReview.accepts_counts());
    }

    #[test]
    fn test_status_can_cancel() {
        assert!(CountStatus::Draft.can_cancel());
        assert!(CountStatus::Scheduled.can_cancel());
        assert!(CountStatus::InProgress.can_cancel());
        assert!(CountStatus::PendingReview.can_cancel());
        assert!(!CountStatus::Completed.can_cancel());
        assert!(!CountStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(CountStatus::Completed.is_terminal());
        assert!(CountStatus::Cancelled.is_terminal());
        assert!(!CountStatus::Draft.is_terminal());
        assert!(!CountStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let status = CountStatus::PendingReview;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"pending_review\"");

        let status = CountStatus::InProgress;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_count_type_serialization() {
        let full = CountType::Full;
        let json = serde_json::to_string(&full).unwrap();
        assert_eq!(json, "\"full\"");

        let abc = CountType::AbcClassA;
        let json = serde_json::to_string(&abc).unwrap();
        assert_eq!(json, "\"abc_class_a\"");
    }

    #[test]
    fn test_id_display_roundtrip() {
        let id = CycleCountId::new();
        let uuid: Uuid = id.into();
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(CycleCountId::from(uuid), id);
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = AdjustmentId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.into_inner()));
    }
}
