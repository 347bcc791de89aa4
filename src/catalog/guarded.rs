use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{CatalogError, CatalogPort, ProductSnapshot, StockDebit};
use crate::metrics::Metrics;
use crate::utils::{
    retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryConfig,
};

/// Wraps any catalog adapter with the caller-side timeout, a circuit breaker
/// and one retry for transient read failures.
///
/// Stock debits are not idempotent and are attempted exactly once. Credits
/// only ever compensate a debit, so they skip the breaker: an open circuit
/// must not strand stock that was already taken.
pub struct GuardedCatalog {
    inner: Arc<dyn CatalogPort>,
    timeout: Duration,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl GuardedCatalog {
    pub fn new(
        inner: Arc<dyn CatalogPort>,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner,
            timeout,
            breaker: CircuitBreaker::new("catalog", breaker),
            metrics,
        }
    }

    async fn timed<T, F>(&self, call: F) -> Result<T, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(CatalogError::Timeout(self.timeout)))
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        let result = self.breaker.call(self.timed(call)).await;

        self.metrics
            .catalog_circuit_state
            .set(self.breaker.state().await.as_gauge());

        result.map_err(|e| match e {
            CircuitBreakerError::CircuitOpen => CatalogError::CircuitOpen,
            CircuitBreakerError::OperationFailed(e) => e,
        })
    }
}

#[async_trait]
impl CatalogPort for GuardedCatalog {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError> {
        retry_on_transient("catalog.product", &RetryConfig::once(), |_attempt| {
            self.guarded(self.inner.product(product_id))
        })
        .await
    }

    async fn try_decrement(&self, product_id: Uuid, quantity: u32) -> Result<StockDebit, CatalogError> {
        self.guarded(self.inner.try_decrement(product_id, quantity)).await
    }

    /// A refused credit never reached the catalog and is sent once more. A
    /// timed-out credit may have landed, so it is not repeated.
    async fn increment(&self, product_id: Uuid, quantity: u32) -> Result<(), CatalogError> {
        match self.timed(self.inner.increment(product_id, quantity)).await {
            Err(CatalogError::Unavailable(reason)) => {
                tracing::warn!(
                    product_id = %product_id,
                    quantity = quantity,
                    reason = %reason,
                    "Stock credit refused, retrying once"
                );
                self.timed(self.inner.increment(product_id, quantity)).await
            }
            outcome => outcome,
        }
    }
}
