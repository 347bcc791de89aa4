use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::{CatalogPort, StockDebit};
use crate::domain::order::{OrderError, OrderLine};
use crate::metrics::Metrics;

// ============================================================================
// Inventory Reservation Manager
// ============================================================================
//
// All-or-nothing stock reservation across the lines of one checkout.
//
// - Debits are conditional and atomic per product (never read-then-write)
// - Lines are debited in input order
// - The first failing line undoes every debit already applied
// - A credit that still fails after the adapter's retry is an operational alert
//
// ============================================================================

/// One applied stock debit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Stock debits held for a checkout that has not been persisted yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    debits: Vec<Debit>,
}

impl Reservation {
    pub fn debits(&self) -> &[Debit] {
        &self.debits
    }

    pub fn is_empty(&self) -> bool {
        self.debits.is_empty()
    }
}

pub struct ReservationManager {
    catalog: Arc<dyn CatalogPort>,
    metrics: Arc<Metrics>,
}

impl ReservationManager {
    pub fn new(catalog: Arc<dyn CatalogPort>, metrics: Arc<Metrics>) -> Self {
        Self { catalog, metrics }
    }

    /// Debit every line or none of them.
    pub async fn reserve(&self, lines: &[OrderLine]) -> Result<Reservation, OrderError> {
        let mut reservation = Reservation::default();

        for line in lines {
            let outcome = self.catalog.try_decrement(line.product_id, line.quantity).await;

            let failure = match outcome {
                Ok(StockDebit::Applied { remaining, low_stock_threshold }) => {
                    if remaining <= low_stock_threshold {
                        tracing::warn!(
                            product_id = %line.product_id,
                            remaining = remaining,
                            threshold = low_stock_threshold,
                            "Product stock at or below low-stock threshold"
                        );
                    }
                    reservation.debits.push(Debit {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    });
                    continue;
                }
                Ok(StockDebit::Insufficient { available }) => OrderError::InsufficientStock {
                    product_id: line.product_id,
                    available,
                    requested: line.quantity,
                },
                Ok(StockDebit::Inactive) => OrderError::ProductInactive(line.product_id),
                Ok(StockDebit::NotFound) => OrderError::ProductNotFound(line.product_id),
                Err(err) => {
                    // The debit may or may not have landed; it is not compensated
                    tracing::error!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %err,
                        "Stock debit outcome unknown"
                    );
                    err.into()
                }
            };

            tracing::info!(
                product_id = %line.product_id,
                reason = failure.reason(),
                applied = reservation.debits.len(),
                "Reservation failed, rolling back applied debits"
            );
            self.rollback(&reservation).await;
            return Err(failure);
        }

        tracing::debug!(lines = reservation.debits.len(), "Stock reserved");
        Ok(reservation)
    }

    /// Give back a reservation whose order could not be persisted.
    pub async fn release(&self, reservation: &Reservation) {
        if reservation.is_empty() {
            return;
        }
        tracing::info!(lines = reservation.debits.len(), "Releasing stock reservation");
        self.rollback(reservation).await;
    }

    async fn rollback(&self, reservation: &Reservation) {
        if reservation.is_empty() {
            return;
        }
        self.metrics.reservation_rollbacks.inc();

        for debit in reservation.debits.iter().rev() {
            if let Err(err) = self.catalog.increment(debit.product_id, debit.quantity).await {
                self.metrics.rollback_failures.inc();
                tracing::error!(
                    alert = "inventory_rollback_failed",
                    product_id = %debit.product_id,
                    quantity = debit.quantity,
                    error = %err,
                    "Compensating stock credit failed; stock is inconsistent"
                );
            }
        }
    }
}
