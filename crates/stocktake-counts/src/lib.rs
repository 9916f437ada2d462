//! Cycle count reconciliation engine.
//!
//! Takes a physical inventory count, compares it against a frozen snapshot
//! of book-recorded stock, computes variances and their financial impact,
//! classifies discrepancies against configurable thresholds, and on
//! approval converts variances into exactly-once ledger adjustments.
//!
//! # Modules
//!
//! - [`types`] - Identifiers and domain enums
//! - [`workflow`] - The session state machine as an explicit transition table
//! - [`count`] - Session and line item aggregates
//! - [`variance`] - Variance, threshold, and accuracy computation
//! - [`catalog`] - Count scope selection over the item catalog
//! - [`ledger`] - The external stock ledger boundary
//! - [`store`] - Session storage with check-and-set transitions
//! - [`capability`] - Injected boolean authorization checks
//! - [`audit`] - Audit logging for every state mutation
//! - [`services`] - [`services::CycleCountService`] and the adjustment publisher
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stocktake_counts::services::CycleCountService;
//!
//! let service = CycleCountService::new(store, catalog, ledger, thresholds, oracle, audit);
//! let count = service.create(tenant_id, input, actor_id).await?;
//! service.start(tenant_id, count.id.into_inner(), actor_id).await?;
//! ```

pub mod audit;
pub mod capability;
pub mod catalog;
pub mod count;
pub mod error;
pub mod ledger;
pub mod services;
pub mod store;
pub mod types;
pub mod variance;
pub mod workflow;

// Re-export commonly used types
pub use count::{CycleCount, CycleCountItem};
pub use error::{CountError, Result};
pub use types::{AdjustmentId, CountStatus, CountType, CycleCountId, CycleCountItemId};
pub use workflow::{transition, CountAction};
