//! Shared fixtures for cycle count integration tests.
//!
//! Builds a full service wired to in-memory stores so the suites run
//! without external infrastructure.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use stocktake_counts::audit::InMemoryCountAuditStore;
use stocktake_counts::capability::StaticCapabilityOracle;
use stocktake_counts::catalog::{CatalogItem, CountScope, InMemoryCatalogStore, ScopedItem};
use stocktake_counts::count::{CreateCycleCountInput, CycleCount, RecordCountInput};
use stocktake_counts::ledger::InMemoryStockLedger;
use stocktake_counts::services::CycleCountService;
use stocktake_counts::store::InMemoryCycleCountStore;
use stocktake_counts::types::{AbcClass, CountType};
use stocktake_counts::variance::InMemoryThresholdStore;

pub fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

pub struct TestContext {
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub actor: Uuid,
    pub store: Arc<InMemoryCycleCountStore>,
    pub catalog: Arc<InMemoryCatalogStore>,
    pub ledger: Arc<InMemoryStockLedger>,
    pub thresholds: Arc<InMemoryThresholdStore>,
    pub oracle: Arc<StaticCapabilityOracle>,
    pub audit: Arc<InMemoryCountAuditStore>,
    pub service: CycleCountService,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCycleCountStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let ledger = Arc::new(InMemoryStockLedger::new());
        let thresholds = Arc::new(InMemoryThresholdStore::new());
        let oracle = Arc::new(StaticCapabilityOracle::allow_all());
        let audit = Arc::new(InMemoryCountAuditStore::new());
        let service = CycleCountService::new(
            store.clone(),
            catalog.clone(),
            ledger.clone(),
            thresholds.clone(),
            oracle.clone(),
            audit.clone(),
        );
        Self {
            tenant_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            actor: Uuid::new_v4(),
            store,
            catalog,
            ledger,
            thresholds,
            oracle,
            audit,
            service,
        }
    }

    /// Seed one stock item into the catalog and the ledger, returning its id.
    pub async fn seed_item(&self, quantity: i64, unit_cost: i64) -> Uuid {
        self.seed_classified_item(quantity, unit_cost, None).await
    }

    /// Seed one stock item with a velocity class.
    pub async fn seed_classified_item(
        &self,
        quantity: i64,
        unit_cost: i64,
        abc_class: Option<AbcClass>,
    ) -> Uuid {
        let stock_item_id = Uuid::new_v4();
        self.catalog
            .add_item(
                self.tenant_id,
                self.warehouse_id,
                CatalogItem {
                    stock_item_id,
                    batch_id: None,
                    abc_class,
                    active: true,
                },
            )
            .await;
        self.ledger
            .set_balance(
                self.tenant_id,
                self.warehouse_id,
                stock_item_id,
                None,
                dec(quantity),
                dec(unit_cost),
            )
            .await;
        stock_item_id
    }

    /// Create a spot count over the given stock items.
    pub async fn create_spot_count(&self, stock_item_ids: &[Uuid]) -> CycleCount {
        let input = CreateCycleCountInput {
            warehouse_id: self.warehouse_id,
            count_type: CountType::Spot,
            scope: CountScope {
                sample_size: None,
                spot_items: Some(
                    stock_item_ids
                        .iter()
                        .map(|&stock_item_id| ScopedItem {
                            stock_item_id,
                            batch_id: None,
                        })
                        .collect(),
                ),
            },
            count_number: None,
            blind_count: false,
            scheduled_at: None,
            notes: None,
        };
        self.service
            .create(self.tenant_id, input, self.actor)
            .await
            .expect("create spot count")
    }

    /// Create and start a spot count over the given stock items.
    pub async fn start_spot_count(&self, stock_item_ids: &[Uuid]) -> CycleCount {
        let count = self.create_spot_count(stock_item_ids).await;
        self.service
            .start(self.tenant_id, count.id.into_inner(), self.actor)
            .await
            .expect("start spot count")
    }

    /// Record a counted quantity for one stock item.
    pub async fn record(&self, count_id: Uuid, stock_item_id: Uuid, quantity: i64) {
        self.service
            .record_count(
                self.tenant_id,
                count_id,
                RecordCountInput {
                    stock_item_id,
                    batch_id: None,
                    quantity: dec(quantity),
                    notes: None,
                },
                self.actor,
            )
            .await
            .expect("record count");
    }
}
