// ============================================================================
// Catalog Read Port
// ============================================================================
//
// The product catalog is an external collaborator. The order core only needs
// a flat snapshot of a product and an atomic conditional stock debit.
//
// - memory:  in-process adapter with per-product atomic stock
// - guarded: timeout + circuit breaker + read retry around any adapter
//
// ============================================================================

mod guarded;
pub(crate) mod memory;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderError;
use crate::utils::IsTransient;

pub use guarded::GuardedCatalog;
pub use memory::InMemoryCatalog;

/// Product fields the order core consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_active: bool,
    pub stock: u32,
    #[serde(default)]
    pub low_stock_threshold: u32,
    pub seller_id: Uuid,
    #[serde(default)]
    pub is_digital: bool,
}

/// Outcome of a conditional stock debit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDebit {
    Applied { remaining: u32, low_stock_threshold: u32 },
    Insufficient { available: u32 },
    Inactive,
    NotFound,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog call timed out after {0:?}")]
    Timeout(Duration),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("catalog circuit breaker is open")]
    CircuitOpen,
}

impl IsTransient for CatalogError {
    fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Timeout(_) | CatalogError::Unavailable(_))
    }
}

impl From<CatalogError> for OrderError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Timeout(_) => OrderError::UpstreamTimeout(err.to_string()),
            CatalogError::Unavailable(_) | CatalogError::CircuitOpen => {
                OrderError::UpstreamUnavailable(err.to_string())
            }
        }
    }
}

#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError>;

    /// Debit `quantity` only if the product is active and has at least that
    /// much stock. Must be a single atomic operation.
    async fn try_decrement(&self, product_id: Uuid, quantity: u32) -> Result<StockDebit, CatalogError>;

    /// Compensating credit for a debit that must be undone
    async fn increment(&self, product_id: Uuid, quantity: u32) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_errors_map_to_transient_order_errors() {
        let timeout: OrderError = CatalogError::Timeout(Duration::from_secs(2)).into();
        let open: OrderError = CatalogError::CircuitOpen.into();

        assert!(matches!(timeout, OrderError::UpstreamTimeout(_)));
        assert!(matches!(open, OrderError::UpstreamUnavailable(_)));
        assert!(!CatalogError::CircuitOpen.is_transient());
    }
}
