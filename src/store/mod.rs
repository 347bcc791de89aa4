// ============================================================================
// Order Store
// ============================================================================
//
// Durable home of order documents. Every document carries an explicit
// `version`; updates are compare-and-swap on that version and the order
// number is a unique index.
//
// ============================================================================

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::utils::IsTransient;

pub use memory::InMemoryOrderStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("order number {0} already exists")]
    DuplicateOrderNumber(String),

    #[error("order {0} already exists")]
    DuplicateId(Uuid),

    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("version conflict on order {order_id}: expected {expected}, found {actual}")]
    VersionConflict {
        order_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(order_id) => OrderError::OrderNotFound(order_id),
            StoreError::VersionConflict { order_id, .. } => {
                OrderError::ConcurrentModification(order_id)
            }
            StoreError::Timeout(_) => OrderError::UpstreamTimeout(err.to_string()),
            StoreError::DuplicateOrderNumber(_) | StoreError::DuplicateId(_) => {
                OrderError::Storage(err.to_string())
            }
        }
    }
}

/// Customer order listing filter; `page` is 1-based
#[derive(Debug, Clone, Copy)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub limit: u32,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: 10,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order; fails on a duplicate id or order number
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Replace the stored document if its version still equals
    /// `expected_version`. Returns the new version.
    async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError>;

    /// One page of a customer's orders, newest first, plus the total count
    async fn list_for_customer(
        &self,
        customer_id: Uuid,
        filter: OrderFilter,
    ) -> Result<(Vec<Order>, u64), StoreError>;
}
