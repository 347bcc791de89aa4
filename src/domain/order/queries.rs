use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::{OrderFilter, OrderRepository, StoreError};
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::{Caller, OrderStatus, Tracking};

// ============================================================================
// Order Query / Tracking Port
// ============================================================================

/// One page of a customer's orders
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_pages: u64,
    pub current_page: u32,
    pub total: u64,
}

/// Public tracking projection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_number: String,
    pub status: OrderStatus,
    pub tracking: Tracking,
    pub is_digital: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for TrackingView {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number.clone(),
            status: order.status,
            tracking: order.tracking.newest_first(),
            is_digital: order.is_digital(),
            created_at: order.created_at,
        }
    }
}

pub struct OrderQueries {
    store: Arc<dyn OrderRepository>,
    timeout: Duration,
}

impl OrderQueries {
    pub fn new(store: Arc<dyn OrderRepository>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Full order for its owner, a seller of one of its lines, or an admin
    pub async fn get_order(&self, order_id: Uuid, caller: &Caller) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_visible_to(caller) {
            return Err(OrderError::NotAuthorized);
        }
        Ok(order)
    }

    pub async fn my_orders(
        &self,
        customer_id: Uuid,
        filter: OrderFilter,
    ) -> Result<OrderPage, OrderError> {
        let filter = OrderFilter {
            page: filter.page.max(1),
            limit: filter.limit.max(1),
            ..filter
        };
        let (orders, total) = retry_on_transient("store.list_for_customer", &RetryConfig::once(), |_| {
            self.with_timeout(self.store.list_for_customer(customer_id, filter))
        })
        .await?;

        Ok(OrderPage {
            orders,
            total_pages: total.div_ceil(u64::from(filter.limit)),
            current_page: filter.page,
            total,
        })
    }

    pub async fn track(&self, order_id: Uuid) -> Result<TrackingView, OrderError> {
        let order = self.load(order_id).await?;
        Ok(TrackingView::from(&order))
    }

    /// Fails with `OrderNotFound` unless the order exists
    pub async fn ensure_exists(&self, order_id: Uuid) -> Result<(), OrderError> {
        self.load(order_id).await.map(|_| ())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        retry_on_transient("store.get", &RetryConfig::once(), |_| {
            self.with_timeout(self.store.get(order_id))
        })
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))
    }

    async fn with_timeout<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeout)))
    }
}
