//! PostgreSQL persistence for the stocktake cycle count engine.
//!
//! Provides row models for the cycle count schema and implementations of
//! the engine's storage traits over `sqlx::PgPool`:
//!
//! - [`store::PgCycleCountStore`] - sessions and items with conditional-update transitions
//! - [`store::PgStockLedger`] - stock levels and adjustment postings
//! - [`store::PgThresholdStore`] - per-tenant variance thresholds
//! - [`store::PgCountAuditStore`] - audit events
//!
//! # Example
//!
//! ```rust,ignore
//! use stocktake_db::{connect_and_migrate, store::PgCycleCountStore};
//!
//! let pool = connect_and_migrate(&database_url).await?;
//! let store = PgCycleCountStore::new(pool.clone());
//! ```

pub mod error;
pub mod migrations;
pub mod models;
pub mod store;

pub use error::DbError;
pub use migrations::{connect_and_migrate, run_migrations};
pub use store::{PgCountAuditStore, PgCycleCountStore, PgStockLedger, PgThresholdStore};
