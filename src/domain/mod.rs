// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order     - Order aggregate, lifecycle controller, returns, queries
// - pricing   - Pure pricing engine over a line snapshot
// - inventory - All-or-nothing stock reservation with compensation
//
// Ports to the outside world (catalog, store, fan-out) live outside this
// layer and are injected as trait objects.
//
// ============================================================================

pub mod order;
pub mod pricing;
pub mod inventory;
