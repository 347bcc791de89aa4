use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::catalog::CatalogPort;
use crate::core::{Aggregate, EventEnvelope};
use crate::domain::inventory::{Reservation, ReservationManager};
use crate::domain::pricing::PricingEngine;
use crate::messaging::{EventPublisher, OrderUpdate};
use crate::metrics::Metrics;
use crate::store::{OrderRepository, StoreError};
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::{NewOrder, Order};
use super::commands::{CartItem, OrderCommand, PlaceOrder};
use super::errors::OrderError;
use super::events::OrderEvent;
use super::number::OrderNumberGenerator;
use super::value_objects::*;

// ============================================================================
// Order Lifecycle Controller
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Store → Fan-out
//
// Checkout is one logical transaction across catalog read, stock debit and
// order insert, held together by compensation: anything that fails after
// the reservation gives the stock back.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Order-number candidates tried before giving up
    pub order_number_attempts: u32,
    /// Caller-side timeout on every store call
    pub store_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            order_number_attempts: 5,
            store_timeout: Duration::from_secs(2),
        }
    }
}

pub struct OrderLifecycle {
    catalog: Arc<dyn CatalogPort>,
    reservations: ReservationManager,
    pricing: PricingEngine,
    store: Arc<dyn OrderRepository>,
    publisher: Arc<dyn EventPublisher>,
    numbers: OrderNumberGenerator,
    metrics: Arc<Metrics>,
    settings: LifecycleSettings,
}

impl OrderLifecycle {
    pub fn new(
        catalog: Arc<dyn CatalogPort>,
        pricing: PricingEngine,
        store: Arc<dyn OrderRepository>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            reservations: ReservationManager::new(catalog.clone(), metrics.clone()),
            catalog,
            pricing,
            store,
            publisher,
            numbers: OrderNumberGenerator::new(),
            metrics,
            settings,
        }
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    pub async fn place_order(&self, command: PlaceOrder) -> Result<Order, OrderError> {
        let started = Instant::now();

        match self.try_place_order(command).await {
            Ok(order) => {
                self.metrics.record_order_created(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    customer_id = %order.customer_id,
                    total = %order.pricing.total,
                    "Order placed"
                );
                Ok(order)
            }
            Err(err) => {
                self.metrics.record_order_failure(err.reason());
                tracing::info!(error = %err, reason = err.reason(), "Checkout rejected");
                Err(err)
            }
        }
    }

    async fn try_place_order(&self, command: PlaceOrder) -> Result<Order, OrderError> {
        let quantities = validate_checkout(&command)?;

        // Resolve and snapshot every line before touching stock
        let mut lines = Vec::with_capacity(command.items.len());
        for (item, quantity) in command.items.iter().zip(quantities) {
            let product = self
                .catalog
                .product(item.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(item.product_id))?;
            if !product.is_active {
                return Err(OrderError::ProductInactive(item.product_id));
            }
            lines.push(OrderLine {
                product_id: product.product_id,
                quantity,
                unit_price: product.price,
                variant: item.variant.clone(),
                seller_id: product.seller_id,
                is_digital: product.is_digital,
            });
        }

        let reservation = self.reservations.reserve(&lines).await?;

        let pricing = match self.pricing.compute(&lines) {
            Ok(pricing) => pricing,
            Err(err) => {
                self.reservations.release(&reservation).await;
                return Err(err);
            }
        };

        let draft = NewOrder {
            id: Uuid::now_v7(),
            customer_id: command.customer_id,
            items: lines,
            pricing,
            shipping_address: command.shipping_address,
            billing_address: command.billing_address,
            payment_method: command.payment_method,
            notes: OrderNotes {
                customer: command.customer_note,
                ..Default::default()
            },
            created_at: Utc::now(),
        };

        let order = self.persist_new(&draft, &reservation).await?;

        let envelope = EventEnvelope::new(order.id, order.version, order.placed_event())
            .with_user(order.customer_id);
        self.publisher.publish(OrderUpdate::from_envelope(&envelope, &order));

        Ok(order)
    }

    /// Insert under a fresh order number, retrying number collisions. Any
    /// failure that leaves the order unwritten releases the reservation.
    async fn persist_new(
        &self,
        draft: &NewOrder,
        reservation: &Reservation,
    ) -> Result<Order, OrderError> {
        let attempts = self.settings.order_number_attempts.max(1);

        for attempt in 1..=attempts {
            let order = draft.with_order_number(self.numbers.next());

            match self.with_timeout(self.store.insert(&order)).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    tracing::warn!(
                        order_number = %number,
                        attempt = attempt,
                        "Order number collision, retrying with a new candidate"
                    );
                }
                Err(StoreError::Timeout(elapsed)) => {
                    return self.reconcile_timed_out_insert(order, reservation, elapsed).await;
                }
                Err(err) => {
                    self.reservations.release(reservation).await;
                    return Err(err.into());
                }
            }
        }

        tracing::error!(
            attempts = attempts,
            "Could not allocate a unique order number"
        );
        self.reservations.release(reservation).await;
        Err(OrderError::OrderNumberExhausted(attempts))
    }

    /// A timed-out insert may still have landed. Look once before deciding
    /// whether the stock has to be given back.
    async fn reconcile_timed_out_insert(
        &self,
        order: Order,
        reservation: &Reservation,
        elapsed: Duration,
    ) -> Result<Order, OrderError> {
        match self.with_timeout(self.store.get(order.id)).await {
            Ok(Some(_)) => {
                tracing::warn!(order_id = %order.id, "Order insert timed out but was committed");
                Ok(order)
            }
            Ok(None) => {
                self.reservations.release(reservation).await;
                Err(StoreError::Timeout(elapsed).into())
            }
            Err(err) => {
                // Unknown outcome: keep the stock held rather than risk overselling
                tracing::error!(
                    alert = "order_insert_unconfirmed",
                    order_id = %order.id,
                    error = %err,
                    "Order insert outcome unknown, reservation kept"
                );
                Err(StoreError::Timeout(elapsed).into())
            }
        }
    }

    // ========================================================================
    // Commands on existing orders
    // ========================================================================

    pub async fn transition_status(
        &self,
        order_id: Uuid,
        caller: &Caller,
        to: OrderStatus,
        tracking: Option<TrackingInfo>,
    ) -> Result<Order, OrderError> {
        let command = OrderCommand::TransitionStatus { to, tracking };
        self.execute(order_id, caller, command, |order| {
            if order.can_be_managed_by(caller) {
                Ok(())
            } else {
                Err(OrderError::NotAuthorized)
            }
        })
        .await
    }

    /// Load, authorize, decide, compare-and-swap, publish.
    ///
    /// A version conflict re-runs the whole cycle once against the fresh
    /// document; a second conflict surfaces as `ConcurrentModification`.
    pub(super) async fn execute<A>(
        &self,
        order_id: Uuid,
        caller: &Caller,
        command: OrderCommand,
        authorize: A,
    ) -> Result<Order, OrderError>
    where
        A: Fn(&Order) -> Result<(), OrderError>,
    {
        let result = self.execute_with_retry(order_id, caller, &command, authorize).await;
        if let Err(err) = &result {
            self.metrics.record_command_failure(command.name(), err.reason());
            tracing::info!(
                order_id = %order_id,
                command = command.name(),
                error = %err,
                "Order command rejected"
            );
        }
        result
    }

    async fn execute_with_retry<A>(
        &self,
        order_id: Uuid,
        caller: &Caller,
        command: &OrderCommand,
        authorize: A,
    ) -> Result<Order, OrderError>
    where
        A: Fn(&Order) -> Result<(), OrderError>,
    {
        let mut retried = false;

        loop {
            let mut order = self.load(order_id).await?;
            authorize(&order)?;

            let expected_version = order.version;
            let from = order.status;
            let events = order.execute(command)?;

            match self.with_timeout(self.store.update(&order, expected_version)).await {
                Ok(version) => {
                    order.version = version;
                    if order.status != from {
                        self.metrics.record_transition(from.as_str(), order.status.as_str());
                    }
                    self.publish(&order, events, caller.user_id);
                    return Ok(order);
                }
                Err(StoreError::VersionConflict { expected, actual, .. }) if !retried => {
                    tracing::warn!(
                        order_id = %order_id,
                        expected = expected,
                        actual = actual,
                        "Version conflict, retrying command once"
                    );
                    self.metrics.optimistic_retries.inc();
                    retried = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads are idempotent and get one retry on a transient store failure.
    pub(super) async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        retry_on_transient("store.get", &RetryConfig::once(), |_| {
            self.with_timeout(self.store.get(order_id))
        })
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))
    }

    fn publish(&self, order: &Order, events: Vec<OrderEvent>, user_id: Uuid) {
        for event in events {
            let envelope = EventEnvelope::new(order.id, order.version, event).with_user(user_id);
            self.publisher.publish(OrderUpdate::from_envelope(&envelope, order));
        }
    }

    async fn with_timeout<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.settings.store_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(timeout)))
    }
}

/// Cheap request checks that need no I/O. Returns the per-line quantities.
fn validate_checkout(command: &PlaceOrder) -> Result<Vec<u32>, OrderError> {
    if command.items.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let mut errors = Vec::new();
    let quantities: Vec<u32> = command
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| line_quantity(index, item, &mut errors))
        .collect();

    let missing = command.shipping_address.missing_fields();
    if errors.is_empty() {
        if !missing.is_empty() {
            return Err(OrderError::InvalidAddress(missing));
        }
        return Ok(quantities);
    }

    // Report address gaps alongside the line problems
    let mut violations = OrderError::InvalidAddress(missing).violations();
    violations.extend(errors);
    Err(OrderError::InvalidRequest(violations))
}

fn line_quantity(index: usize, item: &CartItem, errors: &mut Vec<String>) -> u32 {
    if item.quantity <= 0 {
        errors.push(format!("items[{}].quantity must be greater than 0", index));
        return 0;
    }
    u32::try_from(item.quantity).unwrap_or_else(|_| {
        errors.push(format!("items[{}].quantity is too large", index));
        0
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::memory::tests::product;
    use crate::catalog::{InMemoryCatalog, ProductSnapshot};
    use crate::domain::order::aggregate::tests::sample_address;
    use crate::domain::pricing::PricingPolicy;
    use crate::messaging::testing::RecordingPublisher;
    use crate::messaging::{ORDER_CREATED, ORDER_UPDATED};
    use crate::store::{InMemoryOrderStore, OrderFilter};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) struct Harness {
        pub(crate) lifecycle: Arc<OrderLifecycle>,
        pub(crate) catalog: Arc<InMemoryCatalog>,
        pub(crate) store: Arc<InMemoryOrderStore>,
        pub(crate) publisher: Arc<RecordingPublisher>,
        pub(crate) metrics: Arc<Metrics>,
    }

    pub(crate) fn harness_with_store(store: Arc<dyn OrderRepository>, memory: Arc<InMemoryOrderStore>) -> Harness {
        harness_with_settings(store, memory, LifecycleSettings::default())
    }

    pub(crate) fn harness_with_settings(
        store: Arc<dyn OrderRepository>,
        memory: Arc<InMemoryOrderStore>,
        settings: LifecycleSettings,
    ) -> Harness {
        let catalog = Arc::new(InMemoryCatalog::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let lifecycle = Arc::new(OrderLifecycle::new(
            catalog.clone(),
            PricingEngine::new(PricingPolicy::default()),
            store,
            publisher.clone(),
            metrics.clone(),
            settings,
        ));
        Harness {
            lifecycle,
            catalog,
            store: memory,
            publisher,
            metrics,
        }
    }

    pub(crate) fn harness() -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        harness_with_store(store.clone(), store)
    }

    impl Harness {
        pub(crate) async fn stock(&self, stock: u32, price: Decimal) -> ProductSnapshot {
            let p = product(stock, price);
            self.catalog.upsert(p.clone()).await;
            p
        }
    }

    pub(crate) fn checkout(customer_id: Uuid, items: &[(&ProductSnapshot, i64)]) -> PlaceOrder {
        PlaceOrder {
            customer_id,
            items: items
                .iter()
                .map(|(p, quantity)| CartItem {
                    product_id: p.product_id,
                    quantity: *quantity,
                    variant: None,
                })
                .collect(),
            shipping_address: sample_address(),
            billing_address: None,
            payment_method: PaymentMethod::Card,
            customer_note: None,
        }
    }

    fn seller(order: &Order) -> Caller {
        Caller::new(order.items[0].seller_id, Role::Seller)
    }

    /// Rejects the first `collisions` inserts as order-number duplicates
    struct CollidingStore {
        inner: Arc<InMemoryOrderStore>,
        collisions: u32,
        inserts: AtomicU32,
    }

    #[async_trait]
    impl OrderRepository for CollidingStore {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) < self.collisions {
                return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
            }
            self.inner.insert(order).await
        }

        async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError> {
            self.inner.update(order, expected_version).await
        }

        async fn list_for_customer(
            &self,
            customer_id: Uuid,
            filter: OrderFilter,
        ) -> Result<(Vec<Order>, u64), StoreError> {
            self.inner.list_for_customer(customer_id, filter).await
        }
    }

    /// Bumps the stored version behind the caller's back before each of the
    /// first `conflicts` updates
    struct RacingStore {
        inner: Arc<InMemoryOrderStore>,
        conflicts: u32,
        updates: AtomicU32,
    }

    #[async_trait]
    impl OrderRepository for RacingStore {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            self.inner.insert(order).await
        }

        async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError> {
            if self.updates.fetch_add(1, Ordering::SeqCst) < self.conflicts {
                let mut stored = self.inner.get(order.id).await?.ok_or(StoreError::NotFound(order.id))?;
                stored.notes.admin = Some("touched".to_string());
                let version = stored.version;
                self.inner.update(&stored, version).await?;
            }
            self.inner.update(order, expected_version).await
        }

        async fn list_for_customer(
            &self,
            customer_id: Uuid,
            filter: OrderFilter,
        ) -> Result<(Vec<Order>, u64), StoreError> {
            self.inner.list_for_customer(customer_id, filter).await
        }
    }

    /// The first `stalled_gets` reads hang for `stall` before answering
    pub(crate) struct StallingReads {
        pub(crate) inner: Arc<InMemoryOrderStore>,
        pub(crate) stalled_gets: u32,
        pub(crate) stall: Duration,
        pub(crate) gets: AtomicU32,
    }

    impl StallingReads {
        pub(crate) fn new(inner: Arc<InMemoryOrderStore>, stalled_gets: u32) -> Self {
            Self {
                inner,
                stalled_gets,
                stall: Duration::from_millis(200),
                gets: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for StallingReads {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            self.inner.insert(order).await
        }

        async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
            if self.gets.fetch_add(1, Ordering::SeqCst) < self.stalled_gets {
                tokio::time::sleep(self.stall).await;
            }
            self.inner.get(order_id).await
        }

        async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError> {
            self.inner.update(order, expected_version).await
        }

        async fn list_for_customer(
            &self,
            customer_id: Uuid,
            filter: OrderFilter,
        ) -> Result<(Vec<Order>, u64), StoreError> {
            if self.gets.fetch_add(1, Ordering::SeqCst) < self.stalled_gets {
                tokio::time::sleep(self.stall).await;
            }
            self.inner.list_for_customer(customer_id, filter).await
        }
    }

    /// Every insert reports a timeout, whether or not the write landed. The
    /// follow-up read can be made to time out as well.
    struct UncertainInserts {
        inner: Arc<InMemoryOrderStore>,
        lands: bool,
        readable: bool,
        gets: AtomicU32,
    }

    #[async_trait]
    impl OrderRepository for UncertainInserts {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            if self.lands {
                self.inner.insert(order).await?;
            }
            Err(StoreError::Timeout(Duration::from_secs(2)))
        }

        async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if !self.readable {
                return Err(StoreError::Timeout(Duration::from_secs(2)));
            }
            self.inner.get(order_id).await
        }

        async fn update(&self, order: &Order, expected_version: i64) -> Result<i64, StoreError> {
            self.inner.update(order, expected_version).await
        }

        async fn list_for_customer(
            &self,
            customer_id: Uuid,
            filter: OrderFilter,
        ) -> Result<(Vec<Order>, u64), StoreError> {
            self.inner.list_for_customer(customer_id, filter).await
        }
    }

    fn uncertain(lands: bool, readable: bool) -> (Harness, Arc<UncertainInserts>) {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(UncertainInserts {
            inner: memory.clone(),
            lands,
            readable,
            gets: AtomicU32::new(0),
        });
        (harness_with_store(store.clone(), memory), store)
    }

    #[tokio::test]
    async fn test_place_order_prices_reference_cart() {
        let h = harness();
        let a = h.stock(5, Decimal::new(10, 0)).await;
        let b = h.stock(5, Decimal::new(5, 0)).await;
        let customer = Uuid::new_v4();

        let order = h
            .lifecycle
            .place_order(checkout(customer, &[(&a, 2), (&b, 1)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Pending);
        assert_eq!(order.pricing.subtotal, Decimal::new(2500, 2));
        assert_eq!(order.pricing.tax, Decimal::new(250, 2));
        assert_eq!(order.pricing.total, Decimal::new(3349, 2));
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(h.catalog.stock(a.product_id).await, Some(3));
        assert_eq!(h.catalog.stock(b.product_id).await, Some(4));
        assert_eq!(h.metrics.orders_created.get(), 1);

        let updates = h.publisher.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].event, ORDER_CREATED);
        assert_eq!(updates[0].order_id, order.id);
    }

    #[tokio::test]
    async fn test_price_is_snapshotted_from_catalog() {
        let h = harness();
        let a = h.stock(5, Decimal::new(1999, 2)).await;
        let customer = Uuid::new_v4();

        let order = h.lifecycle.place_order(checkout(customer, &[(&a, 1)])).await.unwrap();
        h.catalog
            .upsert(ProductSnapshot {
                price: Decimal::new(9999, 2),
                stock: 4,
                ..a.clone()
            })
            .await;

        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items[0].unit_price, Decimal::new(1999, 2));
        assert_eq!(stored.items[0].seller_id, a.seller_id);
        assert_eq!(stored.pricing, order.pricing);
    }

    #[tokio::test]
    async fn test_validation_reports_every_violation() {
        let h = harness();
        let a = h.stock(5, Decimal::ONE).await;
        let mut command = checkout(Uuid::new_v4(), &[(&a, 0), (&a, -2)]);
        command.shipping_address.street.clear();

        match h.lifecycle.place_order(command).await {
            Err(OrderError::InvalidRequest(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors[0].contains("shippingAddress.street"));
            }
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
        assert_eq!(h.catalog.stock(a.product_id).await, Some(5));
    }

    #[tokio::test]
    async fn test_empty_cart_and_bad_address() {
        let h = harness();
        let a = h.stock(5, Decimal::ONE).await;

        let empty = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[])).await;
        assert!(matches!(empty, Err(OrderError::EmptyCart)));

        let mut command = checkout(Uuid::new_v4(), &[(&a, 1)]);
        command.shipping_address.zip_code.clear();
        let result = h.lifecycle.place_order(command).await;
        assert!(matches!(result, Err(OrderError::InvalidAddress(f)) if f == vec!["zipCode".to_string()]));
        assert_eq!(h.metrics.orders_created.get(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_products_rejected() {
        let h = harness();
        let a = h.stock(5, Decimal::ONE).await;
        let ghost = product(5, Decimal::ONE);

        let missing = h
            .lifecycle
            .place_order(checkout(Uuid::new_v4(), &[(&a, 1), (&ghost, 1)]))
            .await;
        assert!(matches!(missing, Err(OrderError::ProductNotFound(id)) if id == ghost.product_id));

        h.catalog.set_active(a.product_id, false).await;
        let inactive = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await;
        assert!(matches!(inactive, Err(OrderError::ProductInactive(id)) if id == a.product_id));

        assert_eq!(h.catalog.stock(a.product_id).await, Some(5));
        assert_eq!(h.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_line_leaves_no_partial_debit() {
        let h = harness();
        let a = h.stock(5, Decimal::new(10, 0)).await;
        let b = h.stock(1, Decimal::new(5, 0)).await;

        let result = h
            .lifecycle
            .place_order(checkout(Uuid::new_v4(), &[(&a, 2), (&b, 2)]))
            .await;

        assert!(matches!(
            result,
            Err(OrderError::InsufficientStock { product_id, available: 1, requested: 2 })
                if product_id == b.product_id
        ));
        assert_eq!(h.catalog.stock(a.product_id).await, Some(5));
        assert_eq!(h.catalog.stock(b.product_id).await, Some(1));
        assert_eq!(h.store.count().await, 0);
        assert!(h.publisher.updates().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_sold_exactly_once() {
        let h = harness();
        let last = h.stock(1, Decimal::new(42, 0)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lifecycle = h.lifecycle.clone();
            let command = checkout(Uuid::new_v4(), &[(&last, 1)]);
            handles.push(tokio::spawn(async move { lifecycle.place_order(command).await }));
        }

        let mut placed = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }

        assert_eq!(placed, 1);
        assert_eq!(insufficient, 7);
        assert_eq!(h.catalog.stock(last.product_id).await, Some(0));
        assert_eq!(h.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_order_number_collision_is_retried() {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(CollidingStore {
            inner: memory.clone(),
            collisions: 2,
            inserts: AtomicU32::new(0),
        });
        let h = harness_with_store(store.clone(), memory);
        let a = h.stock(3, Decimal::ONE).await;

        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
        assert!(h.store.get(order.id).await.unwrap().is_some());
        assert_eq!(h.catalog.stock(a.product_id).await, Some(2));
    }

    #[tokio::test]
    async fn test_exhausted_order_numbers_release_stock() {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(CollidingStore {
            inner: memory.clone(),
            collisions: u32::MAX,
            inserts: AtomicU32::new(0),
        });
        let h = harness_with_store(store, memory);
        let a = h.stock(3, Decimal::ONE).await;

        let result = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 2)])).await;

        assert!(matches!(result, Err(OrderError::OrderNumberExhausted(5))));
        assert_eq!(h.catalog.stock(a.product_id).await, Some(3));
        assert_eq!(h.metrics.reservation_rollbacks.get(), 1);
    }

    #[tokio::test]
    async fn test_transition_by_seller_appends_and_publishes() {
        let h = harness();
        let a = h.stock(3, Decimal::ONE).await;
        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        let updated = h
            .lifecycle
            .transition_status(order.id, &seller(&order), OrderStatus::Confirmed, None)
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(updated.version, order.version + 1);
        assert_eq!(updated.tracking.updates.len(), 1);

        let updates = h.publisher.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].event, ORDER_UPDATED);
        assert_eq!(updates[1].status, OrderStatus::Confirmed);
        assert_eq!(updates[1].sequence, updated.version);
        assert_eq!(
            h.metrics
                .status_transitions
                .with_label_values(&["pending", "confirmed"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_transition_requires_seller_or_admin() {
        let h = harness();
        let a = h.stock(3, Decimal::ONE).await;
        let customer = Uuid::new_v4();
        let order = h.lifecycle.place_order(checkout(customer, &[(&a, 1)])).await.unwrap();

        // Rejected even though pending → confirmed would be valid
        let owner = Caller::new(customer, Role::Customer);
        let stranger = Caller::new(Uuid::new_v4(), Role::Seller);
        for caller in [owner, stranger] {
            let result = h
                .lifecycle
                .transition_status(order.id, &caller, OrderStatus::Confirmed, None)
                .await;
            assert!(matches!(result, Err(OrderError::NotAuthorized)));
        }

        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        let result = h
            .lifecycle
            .transition_status(order.id, &admin, OrderStatus::Cancelled, None)
            .await;
        assert_eq!(result.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_not_persisted() {
        let h = harness();
        let a = h.stock(3, Decimal::ONE).await;
        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        let result = h
            .lifecycle
            .transition_status(order.id, &seller(&order), OrderStatus::Shipped, None)
            .await;

        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped })
        ));
        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);
        assert_eq!(h.publisher.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let h = harness();
        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        let id = Uuid::new_v4();

        let result = h
            .lifecycle
            .transition_status(id, &admin, OrderStatus::Confirmed, None)
            .await;

        assert!(matches!(result, Err(OrderError::OrderNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_version_conflict_retried_once() {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(RacingStore {
            inner: memory.clone(),
            conflicts: 1,
            updates: AtomicU32::new(0),
        });
        let h = harness_with_store(store, memory);
        let a = h.stock(3, Decimal::ONE).await;
        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        let updated = h
            .lifecycle
            .transition_status(order.id, &seller(&order), OrderStatus::Confirmed, None)
            .await
            .unwrap();

        // Retry ran against the fresh document, so the concurrent edit survives
        assert_eq!(updated.notes.admin.as_deref(), Some("touched"));
        assert_eq!(updated.tracking.updates.len(), 1);
        assert_eq!(h.metrics.optimistic_retries.get(), 1);
    }

    #[tokio::test]
    async fn test_repeated_version_conflict_surfaces() {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(RacingStore {
            inner: memory.clone(),
            conflicts: 2,
            updates: AtomicU32::new(0),
        });
        let h = harness_with_store(store, memory);
        let a = h.stock(3, Decimal::ONE).await;
        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        let result = h
            .lifecycle
            .transition_status(order.id, &seller(&order), OrderStatus::Confirmed, None)
            .await;

        assert!(matches!(result, Err(OrderError::ConcurrentModification(id)) if id == order.id));
        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(h.publisher.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_insert_that_landed_succeeds() {
        let (h, store) = uncertain(true, true);
        let a = h.stock(5, Decimal::new(10, 0)).await;

        let order = h
            .lifecycle
            .place_order(checkout(Uuid::new_v4(), &[(&a, 2)]))
            .await
            .unwrap();

        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.get(order.id).await.unwrap().unwrap().order_number, order.order_number);
        assert_eq!(h.catalog.stock(a.product_id).await, Some(3));
        assert_eq!(h.publisher.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_insert_that_was_lost_releases_stock() {
        let (h, store) = uncertain(false, true);
        let a = h.stock(5, Decimal::new(10, 0)).await;

        let result = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 2)])).await;

        assert!(matches!(result, Err(OrderError::UpstreamTimeout(_))));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.count().await, 0);
        assert_eq!(h.catalog.stock(a.product_id).await, Some(5));
        assert!(h.publisher.updates().is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_insert_keeps_stock_held() {
        let (h, store) = uncertain(false, false);
        let a = h.stock(5, Decimal::new(10, 0)).await;

        let result = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 2)])).await;

        assert!(matches!(result, Err(OrderError::UpstreamTimeout(_))));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(h.catalog.stock(a.product_id).await, Some(3));
        assert!(h.publisher.updates().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_read_retried_before_transition() {
        let memory = Arc::new(InMemoryOrderStore::new());
        let store = Arc::new(StallingReads::new(memory.clone(), 1));
        let settings = LifecycleSettings {
            store_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let h = harness_with_settings(store.clone(), memory, settings);
        let a = h.stock(3, Decimal::ONE).await;
        let order = h.lifecycle.place_order(checkout(Uuid::new_v4(), &[(&a, 1)])).await.unwrap();

        let updated = h
            .lifecycle
            .transition_status(order.id, &seller(&order), OrderStatus::Confirmed, None)
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }
}
