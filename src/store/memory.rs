use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderFilter, OrderRepository, StoreError};
use crate::domain::order::Order;

#[derive(Default)]
struct Documents {
    orders: HashMap<Uuid, Order>,
    order_numbers: HashSet<String>,
}

/// In-process document store. Insert and compare-and-swap run under the write
/// lock, which makes each of them a single atomic step.
#[derive(Default)]
pub struct InMemoryOrderStore {
    documents: RwLock<Documents>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn count(&self) -> usize {
        self.documents.read().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut docs = self.documents.write().await;

        if docs.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateId(order.id));
        }
        if !docs.order_numbers.insert(order.order_number.clone()) {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }
        docs.orders.insert(order.id, order.clone());

        tracing::debug!(
            order_id = %order.id,
            order_number = %order.order_number,
            "Order document inserted"
        );
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.documents.read().await.orders.get(&order_id).cloned())
    }

    async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError> {
        let mut docs = self.documents.write().await;
        let stored = docs
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::NotFound(order.id))?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let new_version = expected_version + 1;
        *stored = Order {
            version: new_version,
            ..order.clone()
        };
        Ok(new_version)
    }

    async fn list_for_customer(
        &self,
        customer_id: Uuid,
        filter: OrderFilter,
    ) -> Result<(Vec<Order>, u64), StoreError> {
        let docs = self.documents.read().await;
        let mut matching: Vec<&Order> = docs
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let limit = filter.limit.max(1) as usize;
        let skip = (filter.page.max(1) as usize - 1) * limit;
        let page = matching.into_iter().skip(skip).take(limit).cloned().collect();

        Ok((page, total))
    }
}
