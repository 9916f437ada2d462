//! Cycle count workflow state machine.
//!
//! The lifecycle is a closed transition table rather than scattered boolean
//! flags: [`transition`] is a pure function from `(status, action)` to the
//! next status, and every illegal pair fails with a distinct
//! [`CountError::InvalidTransition`]. Persistence layers additionally guard
//! each transition with a conditional update on `status` so racing callers
//! serialize; exactly one wins, the rest observe the same typed error.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CountError, Result};
use crate::types::CountStatus;

/// Actions that drive the cycle count lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountAction {
    /// Lock the snapshot and open the session for counting.
    Start,
    /// Record or correct a counted quantity for one item.
    RecordCount,
    /// Submit a fully counted session for review.
    SubmitForReview,
    /// Approve the session and publish adjustments.
    Approve,
    /// Send the session back for recounting.
    Reject,
    /// Abandon the session.
    Cancel,
    /// Re-invoke the adjustment publisher on a completed session.
    PublishAdjustments,
}

impl fmt::Display for CountAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::RecordCount => write!(f, "record a count for"),
            Self::SubmitForReview => write!(f, "submit"),
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Cancel => write!(f, "cancel"),
            Self::PublishAdjustments => write!(f, "publish adjustments for"),
        }
    }
}

/// Compute the status a legal action leads to, or fail with
/// [`CountError::InvalidTransition`].
///
/// `Draft` and `Scheduled` are equivalent pre-start states. `RecordCount`
/// is a self-transition: it never changes the status but is guarded like
/// any other action.
pub fn transition(status: CountStatus, action: CountAction) -> Result<CountStatus> {
    let next = match (status, action) {
        (CountStatus::Draft | CountStatus::Scheduled, CountAction::Start) => {
            CountStatus::InProgress
        }
        (CountStatus::InProgress, CountAction::RecordCount) => CountStatus::InProgress,
        (CountStatus::InProgress, CountAction::SubmitForReview) => CountStatus::PendingReview,
        (CountStatus::PendingReview, CountAction::Approve) => CountStatus::Completed,
        (CountStatus::PendingReview, CountAction::Reject) => CountStatus::InProgress,
        // Publication is retriable on a completed session; the per-item
        // guard makes the re-invocation safe.
        (CountStatus::Completed, CountAction::PublishAdjustments) => CountStatus::Completed,
        (s, CountAction::Cancel) if !s.is_terminal() => CountStatus::Cancelled,
        (status, action) => return Err(CountError::InvalidTransition { status, action }),
    };
    Ok(next)
}
