use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CatalogError, CatalogPort, ProductSnapshot, StockDebit};

struct CatalogEntry {
    product: ProductSnapshot,
    active: AtomicBool,
    stock: AtomicU32,
}

impl CatalogEntry {
    fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            is_active: self.active.load(Ordering::SeqCst),
            stock: self.stock.load(Ordering::SeqCst),
            ..self.product.clone()
        }
    }
}

/// In-process catalog. The map lock is only held for lookups; stock changes
/// are compare-and-swap on the product's own counter, so debits on different
/// products never contend.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<Uuid, Arc<CatalogEntry>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, product: ProductSnapshot) {
        let entry = CatalogEntry {
            active: AtomicBool::new(product.is_active),
            stock: AtomicU32::new(product.stock),
            product,
        };
        self.entries
            .write()
            .await
            .insert(entry.product.product_id, Arc::new(entry));
    }

    pub async fn set_active(&self, product_id: Uuid, active: bool) -> bool {
        match self.entry(product_id).await {
            Some(entry) => {
                entry.active.store(active, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn stock(&self, product_id: Uuid) -> Option<u32> {
        self.entry(product_id)
            .await
            .map(|entry| entry.stock.load(Ordering::SeqCst))
    }

    /// Load a JSON array of product snapshots, replacing existing entries.
    pub async fn seed_from_file(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading catalog seed {}", path.display()))?;
        let products: Vec<ProductSnapshot> = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing catalog seed {}", path.display()))?;

        let count = products.len();
        for product in products {
            self.upsert(product).await;
        }
        Ok(count)
    }

    async fn entry(&self, product_id: Uuid) -> Option<Arc<CatalogEntry>> {
        self.entries.read().await.get(&product_id).cloned()
    }
}

#[async_trait]
impl CatalogPort for InMemoryCatalog {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError> {
        Ok(self.entry(product_id).await.map(|entry| entry.snapshot()))
    }

    async fn try_decrement(&self, product_id: Uuid, quantity: u32) -> Result<StockDebit, CatalogError> {
        let Some(entry) = self.entry(product_id).await else {
            return Ok(StockDebit::NotFound);
        };
        if !entry.active.load(Ordering::SeqCst) {
            return Ok(StockDebit::Inactive);
        }

        match entry
            .stock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |stock| stock.checked_sub(quantity))
        {
            Ok(previous) => Ok(StockDebit::Applied {
                remaining: previous - quantity,
                low_stock_threshold: entry.product.low_stock_threshold,
            }),
            Err(available) => Ok(StockDebit::Insufficient { available }),
        }
    }

    async fn increment(&self, product_id: Uuid, quantity: u32) -> Result<(), CatalogError> {
        let entry = self
            .entry(product_id)
            .await
            .ok_or_else(|| CatalogError::Unavailable(format!("product {} vanished", product_id)))?;
        entry
            .stock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |stock| stock.checked_add(quantity))
            .map_err(|_| CatalogError::Unavailable(format!("stock overflow for {}", product_id)))?;
        Ok(())
    }
}
