// Private module declaration
mod server;

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order core
// ============================================================================
//
// - Order creation throughput, latency and failures by reason
// - Inventory rollbacks, and rollback failures (operational alert)
// - Status transitions and optimistic-lock retries
// - Notification fan-out deliveries and drops
// - Catalog circuit breaker state
//
// Scraped via /metrics on the metrics port.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order creation
    pub orders_created: IntCounter,
    pub order_failures: IntCounterVec,
    pub order_creation_duration: Histogram,

    // Inventory
    pub reservation_rollbacks: IntCounter,
    pub rollback_failures: IntCounter,

    // Lifecycle
    pub status_transitions: IntCounterVec,
    pub command_failures: IntCounterVec,
    pub optimistic_retries: IntCounter,

    // Fan-out
    pub notifications_delivered: IntCounter,
    pub notifications_dropped: IntCounter,

    // Upstream
    pub catalog_circuit_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders persisted")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_failures = IntCounterVec::new(
            Opts::new("order_creation_failures_total", "Rejected or failed checkouts"),
            &["reason"],
        )?;
        registry.register(Box::new(order_failures.clone()))?;

        let order_creation_duration = Histogram::with_opts(
            HistogramOpts::new("order_creation_duration_seconds", "End-to-end checkout latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(order_creation_duration.clone()))?;

        let reservation_rollbacks = IntCounter::new(
            "reservation_rollbacks_total",
            "Reservations undone by compensating stock credits",
        )?;
        registry.register(Box::new(reservation_rollbacks.clone()))?;

        let rollback_failures = IntCounter::new(
            "inventory_rollback_failures_total",
            "Compensating stock credits that failed; stock may be inconsistent",
        )?;
        registry.register(Box::new(rollback_failures.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let command_failures = IntCounterVec::new(
            Opts::new("order_command_failures_total", "Rejected order commands"),
            &["command", "reason"],
        )?;
        registry.register(Box::new(command_failures.clone()))?;

        let optimistic_retries = IntCounter::new(
            "order_optimistic_retries_total",
            "Commands retried after a version conflict",
        )?;
        registry.register(Box::new(optimistic_retries.clone()))?;

        let notifications_delivered = IntCounter::new(
            "order_notifications_delivered_total",
            "Order events handed to subscribers",
        )?;
        registry.register(Box::new(notifications_delivered.clone()))?;

        let notifications_dropped = IntCounter::new(
            "order_notifications_dropped_total",
            "Order events dropped for slow subscribers",
        )?;
        registry.register(Box::new(notifications_dropped.clone()))?;

        let catalog_circuit_state = IntGauge::new(
            "catalog_circuit_breaker_state",
            "Catalog circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(catalog_circuit_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_failures,
            order_creation_duration,
            reservation_rollbacks,
            rollback_failures,
            status_transitions,
            command_failures,
            optimistic_retries,
            notifications_delivered,
            notifications_dropped,
            catalog_circuit_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, duration_secs: f64) {
        self.orders_created.inc();
        self.order_creation_duration.observe(duration_secs);
    }

    pub fn record_order_failure(&self, reason: &str) {
        self.order_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_command_failure(&self, command: &str, reason: &str) {
        self.command_failures.with_label_values(&[command, reason]).inc();
    }
}
