//! Error types for the cycle count engine.

use thiserror::Error;
use uuid::Uuid;

use crate::types::CountStatus;
use crate::workflow::CountAction;

/// Errors produced by cycle count operations.
///
/// Every rejected action names the specific precondition that failed so
/// callers never see a generic failure for a guarded transition.
#[derive(Debug, Error)]
pub enum CountError {
    /// Cycle count session not found.
    #[error("Cycle count not found: {0}")]
    CountNotFound(Uuid),

    /// Count line item not found within the session.
    #[error("Cycle count item not found: {0}")]
    ItemNotFound(Uuid),

    /// Stock item is not part of the session's locked scope.
    #[error("Stock item {stock_item_id} is not in scope for cycle count {count_id}")]
    ItemNotInScope {
        count_id: Uuid,
        stock_item_id: Uuid,
    },

    /// The requested action is not legal from the session's current status.
    #[error("Cannot {action} a cycle count in {status} status")]
    InvalidTransition {
        status: CountStatus,
        action: CountAction,
    },

    /// Submit was attempted while items remain uncounted.
    #[error("Cycle count is incomplete: {remaining} item(s) still uncounted")]
    IncompleteCount { remaining: i64 },

    /// A session cannot be started with an empty item scope.
    #[error("Cycle count has no items in scope")]
    NoItemsInScope,

    /// Rejection requires a non-empty reason.
    #[error("A rejection reason is required")]
    RejectionReasonRequired,

    /// A counted quantity failed validation.
    #[error("Invalid counted quantity: {0}")]
    InvalidQuantity(String),

    /// A human-readable count number is already in use in the tenant.
    #[error("Count number already exists: {0}")]
    CountNumberExists(String),

    /// General input validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The capability oracle denied the action for this actor.
    #[error("Actor {actor_id} is not permitted to {action}")]
    Unauthorized { actor_id: Uuid, action: String },

    /// The stock ledger rejected a balance read or adjustment write.
    #[error("Stock ledger error: {0}")]
    Ledger(String),

    /// Variance threshold configuration failed validation.
    #[error("Invalid variance thresholds: {0}")]
    InvalidThresholds(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CountError {
    /// Check if this error represents a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CountNotFound(_) | Self::ItemNotFound(_))
    }

    /// Check if this error represents a conflict with existing state.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CountNumberExists(_))
    }

    /// Check if this error represents a failed transition precondition.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::IncompleteCount { .. } | Self::NoItemsInScope
        )
    }

    /// Check if this error represents a denied capability.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Result type alias for cycle count operations.
pub type Result<T> = std::result::Result<T, CountError>;
