//! Catalog access and count scope selection.
//!
//! The catalog is an external collaborator: the engine only needs to
//! enumerate candidate item/batch pairs per count type. Selection runs at
//! session creation; the chosen set is persisted with the session so the
//! scope stays fixed no matter how the catalog changes afterwards.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CountError, Result};
use crate::types::{AbcClass, CountType};

/// A candidate stock item known to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// The stock item.
    pub stock_item_id: Uuid,
    /// The batch, if the item is batch-tracked.
    pub batch_id: Option<Uuid>,
    /// Velocity classification, if the item has been classified.
    pub abc_class: Option<AbcClass>,
    /// Whether the item is active in the warehouse.
    pub active: bool,
}

/// One item/batch pair selected into a count's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedItem {
    /// The stock item.
    pub stock_item_id: Uuid,
    /// The batch, if batch-tracked.
    pub batch_id: Option<Uuid>,
}

/// Selection configuration supplied at session creation.
///
/// Only the field matching the count type is consulted; a missing required
/// field fails validation at selection time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountScope {
    /// Number of items to draw for `Random` counts.
    pub sample_size: Option<usize>,
    /// Explicit item/batch pairs for `Spot` counts.
    pub spot_items: Option<Vec<ScopedItem>>,
}

/// Trait for enumerating candidate items per warehouse.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// List active items in a warehouse, batch-expanded.
    async fn list_active_items(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Vec<CatalogItem>>;
}

/// Select the item/batch set in scope for a count.
///
/// `Full` takes every active item; the ABC types filter on velocity class;
/// `Random` draws a uniform sample of the configured size; `Spot` uses the
/// explicitly listed pairs verbatim.
pub async fn select_in_scope(
    catalog: &dyn CatalogStore,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    count_type: CountType,
    scope: &CountScope,
) -> Result<Vec<ScopedItem>> {
    if count_type == CountType::Spot {
        let items = scope
            .spot_items
            .as_ref()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| {
                CountError::Validation("Spot counts require an explicit item list".to_string())
            })?;
        return Ok(items.clone());
    }

    let candidates = catalog.list_active_items(tenant_id, warehouse_id).await?;
    let actives = candidates.into_iter().filter(|i| i.active);

    let selected: Vec<ScopedItem> = match count_type {
        CountType::Full => actives.map(Into::into).collect(),
        CountType::AbcClassA => class_filter(actives, AbcClass::A),
        CountType::AbcClassB => class_filter(actives, AbcClass::B),
        CountType::AbcClassC => class_filter(actives, AbcClass::C),
        CountType::Random => {
            let sample_size = scope.sample_size.filter(|n| *n > 0).ok_or_else(|| {
                CountError::Validation(
                    "Random counts require a positive sample size".to_string(),
                )
            })?;
            let pool: Vec<ScopedItem> = actives.map(Into::into).collect();
            let mut rng = rand::thread_rng();
            pool.choose_multiple(&mut rng, sample_size).copied().collect()
        }
        CountType::Spot => unreachable!("handled above"),
    };

    Ok(selected)
}

fn class_filter<I>(items: I, class: AbcClass) -> Vec<ScopedItem>
where
    I: Iterator<Item = CatalogItem>,
{
    items
        .filter(|i| i.abc_class == Some(class))
        .map(Into::into)
        .collect()
}

impl From<CatalogItem> for ScopedItem {
    fn from(item: CatalogItem) -> Self {
        Self {
            stock_item_id: item.stock_item_id,
            batch_id: item.batch_id,
        }
    }
}

/// In-memory implementation of [`CatalogStore`] for testing.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    items: RwLock<HashMap<(Uuid, Uuid), Vec<CatalogItem>>>,
}

impl InMemoryCatalogStore {
    /// Create a new in-memory catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Add a catalog item to a warehouse.
    pub async fn add_item(&self, tenant_id: Uuid, warehouse_id: Uuid, item: CatalogItem) {
        let mut items = self.items.write().await;
        items
            .entry((tenant_id, warehouse_id))
            .or_default()
            .push(item);
    }

    /// Clear all catalog data.
    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_active_items(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Vec<CatalogItem>> {
        let items = self.items.read().await;
        Ok(items
            .get(&(tenant_id, warehouse_id))
            .cloned()
            .unwrap_or_default())
    }
}
