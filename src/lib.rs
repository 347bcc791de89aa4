// ============================================================================
// Marketplace Orders - Order Lifecycle & Inventory Consistency
// ============================================================================
//
// Structure:
// - core/      - Aggregate trait and event envelope
// - domain/    - Order aggregate, lifecycle, pricing, reservations
// - catalog/   - Catalog read port and adapters
// - store/     - Order document store port and adapters
// - messaging/ - Order update publication
// - actors/    - Notification fan-out hub
// - api/       - HTTP endpoints and the join-order event stream
// - metrics/   - Prometheus metrics and their HTTP server
// - utils/     - Retry and circuit breaker
//
// ============================================================================

pub mod actors;
pub mod api;
pub mod catalog;
pub mod config;
pub mod core;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod store;
pub mod utils;
