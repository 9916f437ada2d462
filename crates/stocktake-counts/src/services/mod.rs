//! Business services for the cycle count engine.

pub mod cycle_count;
pub mod publisher;

pub use cycle_count::{ApprovalOutcome, CycleCountService};
pub use publisher::{AdjustmentFailure, AdjustmentPublisher, PublicationOutcome};
